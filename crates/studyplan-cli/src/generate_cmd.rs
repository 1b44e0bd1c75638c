//! `studyplan generate`: produce a plan on the command line without
//! touching the database.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;

use tracing::warn;

use studyplan_core::generate::{
    ChatError, LearningRequest, OpenAiClient, OpenAiConfig, PlanGenerator, RequestOverrides,
    build_prompt,
};
use studyplan_db::models::{Language, StudyLevel};

#[derive(Debug, Clone, Args)]
pub struct GenerateArgs {
    /// What the learner wants to achieve
    #[arg(long)]
    pub goal: String,
    /// Current level: beginner, intermediate, advanced
    #[arg(long)]
    pub level: Option<StudyLevel>,
    /// Minutes available per day (1-1440)
    #[arg(long)]
    pub minutes: Option<u32>,
    /// Target date (YYYY-MM-DD)
    #[arg(long)]
    pub deadline: Option<NaiveDate>,
    /// Comma-separated focus areas (e.g. reading,writing)
    #[arg(long, value_delimiter = ',')]
    pub focus: Vec<String>,
    /// Comma-separated resource types (e.g. videos,books)
    #[arg(long, value_delimiter = ',')]
    pub resources: Vec<String>,
    /// Language of the generated material
    #[arg(long)]
    pub language: Option<Language>,
    /// Print the prompt instead of generating
    #[arg(long)]
    pub prompt_only: bool,
    /// Skip the configured backend and synthesize locally
    #[arg(long)]
    pub mock: bool,
}

impl GenerateArgs {
    /// Turn the flags into a validated request. No stored profile applies,
    /// so unset values take the generator's defaults.
    pub fn to_request(&self) -> Result<LearningRequest> {
        let overrides = RequestOverrides {
            current_level: self.level,
            daily_minutes: self.minutes,
            focus_areas: Some(self.focus.clone()),
            preferred_resources: Some(self.resources.clone()),
        };
        let mut request = LearningRequest::resolve(&self.goal, self.deadline, &overrides, None)
            .context("invalid learning request")?;
        if let Some(language) = self.language {
            request.language = language;
        }
        Ok(request)
    }
}

/// Build a generator for the resolved backend settings. `None`, or a client
/// that cannot be built, yields a mock-only generator.
pub fn generator_from_config(llm: Option<&OpenAiConfig>) -> PlanGenerator {
    match llm {
        Some(cfg) => generator_with_client(OpenAiClient::new(cfg)),
        None => PlanGenerator::mock(),
    }
}

fn generator_with_client(client: Result<OpenAiClient, ChatError>) -> PlanGenerator {
    match client {
        Ok(client) => PlanGenerator::new(Some(Arc::new(client))),
        Err(e) => {
            warn!(error = %e, "chat client unavailable, generating plans in mock mode");
            PlanGenerator::mock()
        }
    }
}

/// Render what `studyplan generate` prints.
pub async fn render(args: &GenerateArgs, generator: &PlanGenerator) -> Result<String> {
    let request = args.to_request()?;
    if args.prompt_only {
        return Ok(build_prompt(&request));
    }

    let (plan, source) = generator.generate(&request).await;
    tracing::info!(?source, model = %plan.model_used, "plan generated");
    serde_json::to_string_pretty(&plan).context("failed to serialize plan")
}

pub async fn run_generate(args: &GenerateArgs, llm: Option<&OpenAiConfig>) -> Result<()> {
    let generator = if args.mock {
        PlanGenerator::mock()
    } else {
        generator_from_config(llm)
    };
    println!("{}", render(args, &generator).await?);
    Ok(())
}
