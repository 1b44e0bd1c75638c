use std::sync::Arc;

use tracing::{info, warn};

use super::client::{ChatClient, ChatError};
use super::content::{ContentError, GeneratedPlan, PlanContent, PlanSource};
use super::mock::{self, MOCK_MODEL};
use super::prompt::{SYSTEM_PROMPT, build_prompt};
use super::request::LearningRequest;

/// Why an external attempt was abandoned in favour of mock synthesis.
#[derive(Debug, thiserror::Error)]
pub enum FallbackReason {
    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("response is not a valid plan: {0}")]
    Malformed(#[from] ContentError),
}

/// Result of asking the chat backend for plan content.
#[derive(Debug)]
pub enum ExternalOutcome {
    Generated(PlanContent),
    Fallback(FallbackReason),
}

/// Produces plan content, through a chat backend when one is configured.
///
/// Stateless apart from the injected client; cheap to share behind an `Arc`.
#[derive(Clone, Default)]
pub struct PlanGenerator {
    client: Option<Arc<dyn ChatClient>>,
}

impl PlanGenerator {
    pub fn new(client: Option<Arc<dyn ChatClient>>) -> Self {
        Self { client }
    }

    /// A generator that always synthesizes locally.
    pub fn mock() -> Self {
        Self { client: None }
    }

    pub fn is_mock(&self) -> bool {
        self.client.is_none()
    }

    /// Generate a plan. Never fails: backend errors degrade to mock output.
    pub async fn generate(&self, request: &LearningRequest) -> (GeneratedPlan, PlanSource) {
        let prompt = build_prompt(request);

        if let Some(client) = &self.client {
            match attempt_external(client.as_ref(), &prompt).await {
                ExternalOutcome::Generated(content) => {
                    let plan = GeneratedPlan {
                        content,
                        model_used: client.model().to_owned(),
                        prompt_used: prompt,
                    };
                    return (plan, PlanSource::External);
                }
                ExternalOutcome::Fallback(reason) => {
                    warn!(
                        model = client.model(),
                        error = %reason,
                        "plan generation failed, falling back to mock mode"
                    );
                }
            }
        }

        let plan = GeneratedPlan {
            content: mock::synthesize(request),
            model_used: MOCK_MODEL.to_owned(),
            prompt_used: prompt,
        };
        (plan, PlanSource::Mock)
    }
}

impl std::fmt::Debug for PlanGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanGenerator")
            .field("model", &self.client.as_ref().map(|c| c.model()))
            .finish()
    }
}

/// One request/response round trip, parsed into plan content.
pub async fn attempt_external(client: &dyn ChatClient, prompt: &str) -> ExternalOutcome {
    let completion = match client.complete_json(SYSTEM_PROMPT, prompt).await {
        Ok(completion) => completion,
        Err(e) => return ExternalOutcome::Fallback(e.into()),
    };

    match PlanContent::from_completion(&completion.content) {
        Ok(content) => {
            match completion.total_tokens {
                Some(tokens) => info!(model = client.model(), tokens, "plan generated"),
                None => info!(model = client.model(), "plan generated"),
            }
            ExternalOutcome::Generated(content)
        }
        Err(e) => ExternalOutcome::Fallback(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use studyplan_db::models::{FocusArea, Language, ResourceType, StudyLevel};

    use super::*;
    use crate::generate::client::ChatCompletion;

    /// Replies with a fixed body, or with an error when `reply` is `None`.
    struct FakeClient {
        reply: Option<String>,
        calls: AtomicUsize,
    }

    impl FakeClient {
        fn replying(body: &str) -> Self {
            Self {
                reply: Some(body.to_owned()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                reply: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ChatClient for FakeClient {
        fn model(&self) -> &str {
            "fake-model"
        }

        async fn complete_json(
            &self,
            system: &str,
            _user: &str,
        ) -> Result<ChatCompletion, ChatError> {
            assert_eq!(system, SYSTEM_PROMPT);
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Some(body) => Ok(ChatCompletion {
                    content: body.clone(),
                    total_tokens: Some(42),
                }),
                None => Err(ChatError::Status {
                    status: 503,
                    body: "unavailable".into(),
                }),
            }
        }
    }

    fn request() -> LearningRequest {
        LearningRequest {
            goal: "IELTS".into(),
            level: StudyLevel::Beginner,
            daily_minutes: 60,
            deadline: None,
            focus_areas: vec![FocusArea::Reading, FocusArea::Writing],
            preferred_resources: vec![ResourceType::Videos, ResourceType::Books],
            language: Language::En,
        }
    }

    #[tokio::test]
    async fn no_client_means_mock() {
        let generator = PlanGenerator::mock();
        assert!(generator.is_mock());

        let (plan, source) = generator.generate(&request()).await;
        assert_eq!(source, PlanSource::Mock);
        assert_eq!(plan.model_used, "mock-mode");
        assert_eq!(plan.prompt_used, build_prompt(&request()));
        assert_eq!(plan.content, mock::synthesize(&request()));
    }

    #[tokio::test]
    async fn well_formed_reply_is_used_verbatim() {
        let client = Arc::new(FakeClient::replying(
            r#"{"topics": [{"name": "Linking words", "priority": "high", "estimated_hours": 3, "description": "d"}],
                "resources": [{"title": "BBC", "type": "website", "description": "news", "url": "https://bbc.co.uk"}]}"#,
        ));
        let generator = PlanGenerator::new(Some(client.clone()));

        let (plan, source) = generator.generate(&request()).await;
        assert_eq!(source, PlanSource::External);
        assert_eq!(plan.model_used, "fake-model");
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);

        assert!(plan.content.weekly_roadmap.is_empty());
        assert!(plan.content.daily_tasks.is_empty());
        assert!(plan.content.checkpoints.is_empty());
        assert_eq!(plan.content.topics[0].name, "Linking words");
        assert_eq!(plan.content.resources[0].kind, ResourceType::Websites);
        assert_eq!(
            plan.content.resources[0].url.as_deref(),
            Some("https://bbc.co.uk")
        );
    }

    #[tokio::test]
    async fn failing_client_falls_back() {
        let client = FakeClient::failing();
        let outcome = attempt_external(&client, "prompt").await;
        assert!(matches!(
            outcome,
            ExternalOutcome::Fallback(FallbackReason::Chat(ChatError::Status { status: 503, .. }))
        ));

        let generator = PlanGenerator::new(Some(Arc::new(FakeClient::failing())));
        let (plan, source) = generator.generate(&request()).await;
        assert_eq!(source, PlanSource::Mock);
        assert_eq!(plan.model_used, "mock-mode");
        assert_eq!(plan.content.weekly_roadmap.len(), 12);
    }

    #[tokio::test]
    async fn malformed_reply_falls_back() {
        for body in ["not json", "[]", r#""a plan""#] {
            let client = FakeClient::replying(body);
            let outcome = attempt_external(&client, "prompt").await;
            assert!(
                matches!(outcome, ExternalOutcome::Fallback(FallbackReason::Malformed(_))),
                "{body:?} should be malformed, got {outcome:?}"
            );
        }

        let generator = PlanGenerator::new(Some(Arc::new(FakeClient::replying("{oops"))));
        let (plan, source) = generator.generate(&request()).await;
        assert_eq!(source, PlanSource::Mock);
        assert_eq!(plan.content.topics.len(), 20);
    }

    #[tokio::test]
    async fn flawed_entries_keep_the_external_plan() {
        let roadmap = r#""weekly_roadmap": [{"week": 1, "focus": "Model week one", "topics": [], "estimated_hours": 5}]"#;
        let bodies = [
            format!(r#"{{{roadmap}, "daily_tasks": [{{"day": 1, "week": 1, "tasks": [{{"title": "t"}}]}}]}}"#),
            format!(r#"{{{roadmap}, "resources": [{{"title": "Blog", "type": "article"}}]}}"#),
            format!(r#"{{{roadmap}, "daily_tasks": [{{"day": 1, "tasks": [{{"type": "reading", "estimated_minutes": 22.5}}]}}]}}"#),
        ];

        for body in bodies {
            let generator = PlanGenerator::new(Some(Arc::new(FakeClient::replying(&body))));
            let (plan, source) = generator.generate(&request()).await;
            assert_eq!(source, PlanSource::External, "{body}");
            assert_eq!(plan.model_used, "fake-model");
            assert_eq!(plan.content.weekly_roadmap.len(), 1);
            assert_eq!(plan.content.weekly_roadmap[0].focus, "Model week one");
        }
    }

    #[tokio::test]
    async fn mock_regeneration_is_identical() {
        let generator = PlanGenerator::mock();
        let (first, _) = generator.generate(&request()).await;
        let (second, _) = generator.generate(&request()).await;
        assert_eq!(first, second);
    }
}
