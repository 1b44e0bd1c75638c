//! Prompt construction for chat-completion backends. Pure string building.

use studyplan_db::models::{FocusArea, ResourceType};

use super::request::LearningRequest;

/// System message sent alongside every prompt.
pub const SYSTEM_PROMPT: &str = "You are an expert educational planner. \
Create detailed, structured study plans in JSON format.";

/// Render a request into the user message of a chat completion.
///
/// Deterministic: identical requests produce byte-identical prompts.
pub fn build_prompt(request: &LearningRequest) -> String {
    let mut prompt = String::new();

    prompt.push_str(
        "Create a comprehensive, structured study plan in JSON format for the following learning goal:\n\n",
    );
    prompt.push_str(&format!("Goal: {}\n", request.goal));
    prompt.push_str(&format!("Current Level: {}\n", request.level));
    prompt.push_str(&format!(
        "Daily Available Time: {} minutes per day\n",
        request.daily_minutes
    ));

    if let Some(deadline) = request.deadline {
        prompt.push_str(&format!("Deadline: {}\n", deadline.format("%Y-%m-%d")));
    }

    if !request.focus_areas.is_empty() {
        prompt.push_str(&format!("Focus Areas: {}\n", join(&request.focus_areas)));
    }

    if !request.preferred_resources.is_empty() {
        prompt.push_str(&format!(
            "Preferred Resource Types: {}\n",
            join(&request.preferred_resources)
        ));
    }

    prompt.push_str(&format!("Preferred Language: {}\n\n", request.language));

    prompt.push_str(&schema_block());

    prompt.push_str(&format!(
        "\nMake the plan realistic, progressive, and tailored to the learner's level and \
         available time. Ensure the tasks of every day fit within the {} minutes per day \
         constraint.",
        request.daily_minutes
    ));

    prompt
}

fn join<T: std::fmt::Display>(tags: &[T]) -> String {
    tags.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Description of the expected JSON shape, with the allowed tag values
/// taken from the vocabularies.
fn schema_block() -> String {
    let task_types = FocusArea::VALUES.join("|");
    let resource_types = ResourceType::VALUES.join("|");

    format!(
        r#"Respond with a single JSON object of the following structure:
{{
    "weekly_roadmap": [
        {{"week": 1, "focus": "Week focus description", "topics": ["topic1", "topic2"], "estimated_hours": 10}}
    ],
    "daily_tasks": [
        {{"day": 1, "week": 1, "tasks": [
            {{"title": "Task title", "description": "Task description", "estimated_minutes": 30, "type": "{task_types}"}}
        ]}}
    ],
    "topics": [
        {{"name": "Topic name", "priority": "high|medium|low", "estimated_hours": 5, "description": "Topic description"}}
    ],
    "resources": [
        {{"title": "Resource title", "type": "{resource_types}", "description": "Resource description", "url": "optional-url-if-applicable"}}
    ],
    "checkpoints": [
        {{"week": 2, "type": "quiz|assessment|review", "description": "Checkpoint description", "topics_covered": ["topic1", "topic2"]}}
    ]
}}
"#
    )
}
