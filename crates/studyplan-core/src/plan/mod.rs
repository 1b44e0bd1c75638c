//! Plans and their generated versions.

pub mod service;

pub use service::{
    NewPlanRequest, PlanServiceError, PlanUpdate, PlanWithVersions, RegenerateRequest,
    create_plan, delete_plan, get_plan_for_user, list_plans_for_user, regenerate_plan,
    update_plan,
};
