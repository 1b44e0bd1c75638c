//! Study-plan content generation.
//!
//! A [`LearningRequest`] is rendered into a prompt, sent to an optional
//! chat-completion backend, and normalized into a [`GeneratedPlan`]. Without
//! a backend, or when the backend fails, the plan is synthesized locally by
//! [`mock::synthesize`].

pub mod client;
pub mod content;
pub mod generator;
pub mod mock;
pub mod prompt;
pub mod request;

pub use client::{ChatClient, ChatCompletion, ChatError, OpenAiClient, OpenAiConfig};
pub use content::{
    Checkpoint, ContentError, DayEntry, GeneratedPlan, PlanContent, PlanSource, Priority, Resource,
    Task, Topic, WeekEntry,
};
pub use generator::{ExternalOutcome, FallbackReason, PlanGenerator};
pub use prompt::{SYSTEM_PROMPT, build_prompt};
pub use request::{LearningRequest, RequestError, RequestOverrides};
