//! Deterministic offline plan synthesis.
//!
//! Used when no chat backend is configured or the backend fails. The shape
//! (counts, bands, budgets) is fixed; the wording is placeholder text.

use studyplan_db::models::{FocusArea, ResourceType};

use super::content::{Checkpoint, DayEntry, PlanContent, Priority, Resource, Task, Topic, WeekEntry};
use super::request::LearningRequest;

/// `model_used` value for synthesized plans.
pub const MOCK_MODEL: &str = "mock-mode";

const WEEKS: u32 = 12;
/// Daily tasks are only laid out for the first two weeks.
const TASK_WEEKS: u32 = 2;
const DAYS_PER_WEEK: u32 = 7;
const MAX_TASKS_PER_DAY: usize = 2;
const MAX_TASK_MINUTES: u32 = 30;
const MIN_TASK_MINUTES: u32 = 10;
const TOPIC_COUNT: usize = 20;
const TOPIC_HOURS: f64 = 2.0;
const GOAL_EXCERPT_CHARS: usize = 50;
const MAX_RESOURCES: usize = 5;
const CHECKPOINT_WEEKS: [u32; 4] = [2, 4, 8, 12];

const DEFAULT_FOCUS: [FocusArea; 4] = [
    FocusArea::Reading,
    FocusArea::Writing,
    FocusArea::Listening,
    FocusArea::Speaking,
];
const DEFAULT_RESOURCES: [ResourceType; 2] = [ResourceType::Videos, ResourceType::Books];

/// Build plan content from the request alone. No randomness, no I/O.
pub fn synthesize(request: &LearningRequest) -> PlanContent {
    let focus: &[FocusArea] = if request.focus_areas.is_empty() {
        &DEFAULT_FOCUS
    } else {
        &request.focus_areas
    };
    let resources: &[ResourceType] = if request.preferred_resources.is_empty() {
        &DEFAULT_RESOURCES
    } else {
        &request.preferred_resources
    };

    PlanContent {
        weekly_roadmap: weekly_roadmap(request.daily_minutes, focus),
        daily_tasks: daily_tasks(request.daily_minutes, focus),
        topics: topics(&request.goal),
        resources: resource_list(resources, request),
        checkpoints: checkpoints(),
    }
}

fn weekly_roadmap(daily_minutes: u32, focus: &[FocusArea]) -> Vec<WeekEntry> {
    let leading = focus
        .iter()
        .take(2)
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let hours = f64::from(daily_minutes) * f64::from(DAYS_PER_WEEK) / 60.0;

    (1..=WEEKS)
        .map(|week| WeekEntry {
            week,
            focus: format!("Week {week} focus: Building foundation in {leading}"),
            topics: vec![format!("Topic {week}.1"), format!("Topic {week}.2")],
            estimated_hours: hours,
        })
        .collect()
}

fn daily_tasks(daily_minutes: u32, focus: &[FocusArea]) -> Vec<DayEntry> {
    let mut days = Vec::new();
    let mut counter = 1;

    for week in 1..=TASK_WEEKS {
        for weekday in 1..=DAYS_PER_WEEK {
            let mut remaining = daily_minutes;
            let mut tasks = Vec::with_capacity(MAX_TASKS_PER_DAY);

            for i in 0..MAX_TASKS_PER_DAY {
                let minutes = (remaining / 2).min(MAX_TASK_MINUTES);
                if minutes < MIN_TASK_MINUTES {
                    break;
                }
                let kind = focus[i % focus.len()];
                tasks.push(Task {
                    title: format!("{} Practice {counter}", capitalize(kind.as_str())),
                    description: format!("Practice {kind} skills with recommended resources"),
                    estimated_minutes: minutes,
                    kind,
                });
                remaining -= minutes;
                counter += 1;
            }

            if !tasks.is_empty() {
                days.push(DayEntry {
                    day: (week - 1) * DAYS_PER_WEEK + weekday,
                    week,
                    tasks,
                });
            }
        }
    }

    days
}

fn topics(goal: &str) -> Vec<Topic> {
    let excerpt: String = goal.chars().take(GOAL_EXCERPT_CHARS).collect();

    (1..=TOPIC_COUNT)
        .map(|rank| Topic {
            name: format!("Topic {rank}: Core Concept"),
            priority: priority_for_rank(rank),
            estimated_hours: TOPIC_HOURS,
            description: format!("Important topic for achieving your goal: {excerpt}..."),
        })
        .collect()
}

/// Ranks 1-7 are high, 8-14 medium, the rest low.
fn priority_for_rank(rank: usize) -> Priority {
    match rank {
        0..=7 => Priority::High,
        8..=14 => Priority::Medium,
        _ => Priority::Low,
    }
}

fn resource_list(kinds: &[ResourceType], request: &LearningRequest) -> Vec<Resource> {
    kinds
        .iter()
        .take(MAX_RESOURCES)
        .enumerate()
        .map(|(i, kind)| Resource {
            title: format!("Recommended {} Resource {}", capitalize(kind.as_str()), i + 1),
            kind: *kind,
            description: format!(
                "A high-quality {kind} resource for {} level learners",
                request.level
            ),
            url: None,
        })
        .collect()
}

fn checkpoints() -> Vec<Checkpoint> {
    CHECKPOINT_WEEKS
        .iter()
        .map(|&week| Checkpoint {
            week,
            kind: "assessment".to_owned(),
            description: format!("Week {week} progress assessment and review"),
            topics_covered: vec![
                format!("Topic {}.1", week - 1),
                format!("Topic {}.2", week - 1),
            ],
        })
        .collect()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
