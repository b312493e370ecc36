use crate::error::{ChatError, Result};
use crate::knowledge::{ANSWER_MARKER, KnowledgeStore};
use crate::llm::{ChatMessage, GenerationClient};
use crate::session::{ConversationSession, ConversationTurn, HistoryWindow};
use crate::utils::preview;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

const CONVERSATIONAL_SYSTEM_PROMPT: &str = "You are Ravi, a Software Engineer with a Master's Degree in Computer Science specializing in Machine Learning.
Your background includes:
- Bachelor's in Electronics and Communication Engineering
- Experience at Oracle and GW Law's Office of Instructional Technology
- Expertise in Python, JavaScript, cloud technologies, and automation
- Strong focus on building efficient developer tools and workflows

Answer questions professionally while maintaining a helpful, knowledgeable tone.
When possible, provide structured responses with clear sections and bullet points.
";

const GUIDED_SYSTEM_PROMPT: &str = "I am Ravi, a Software Engineer with a Master's Degree in Computer Science specializing in Machine Learning.
My background includes:
- Bachelor's in Electronics and Communication Engineering
- Experience at Oracle and GW Law's Office of Instructional Technology
- Expertise in Python, JavaScript, cloud technologies, and automation
- Strong focus on building efficient developer tools and workflows

and You are a digital version of me so try to Answer questions professionally while maintaining a helpful, knowledgeable tone.
When possible, provide structured responses with clear sections and bullet points.
";

const CONVERSATIONAL_PREAMBLE: &str = "Use this context if relevant:\n";
const GUIDED_PREAMBLE: &str =
    "Please use the following information to craft a helpful and accurate response:\n";
const GUIDED_EMPTY_CONTEXT: &str =
    "No additional information is available. Please provide a concise and professional response.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PromptStyle {
    #[default]
    Conversational,
    Guided,
}

impl PromptStyle {
    pub fn default_system_prompt(self) -> &'static str {
        match self {
            PromptStyle::Conversational => CONVERSATIONAL_SYSTEM_PROMPT,
            PromptStyle::Guided => GUIDED_SYSTEM_PROMPT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextJoin {
    #[default]
    Newline,
    BlankLine,
}

impl ContextJoin {
    fn separator(self) -> &'static str {
        match self {
            ContextJoin::Newline => "\n",
            ContextJoin::BlankLine => "\n\n",
        }
    }
}

/// Wording of the context-injection message that follows the user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    pub context_preamble: String,
    pub empty_context_message: Option<String>,
    pub join: ContextJoin,
}

impl PromptTemplate {
    pub fn for_style(style: PromptStyle, join: ContextJoin) -> Self {
        match style {
            PromptStyle::Conversational => Self {
                context_preamble: CONVERSATIONAL_PREAMBLE.to_string(),
                empty_context_message: None,
                join,
            },
            PromptStyle::Guided => Self {
                context_preamble: GUIDED_PREAMBLE.to_string(),
                empty_context_message: Some(GUIDED_EMPTY_CONTEXT.to_string()),
                join,
            },
        }
    }

    pub fn context_message(&self, context: &str) -> String {
        match &self.empty_context_message {
            Some(message) if context.is_empty() => message.clone(),
            _ => format!("{}{}", self.context_preamble, context),
        }
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::for_style(PromptStyle::default(), ContextJoin::default())
    }
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub system_prompt: String,
    pub top_k: usize,
    pub template: PromptTemplate,
    pub history_window: HistoryWindow,
    pub generation_timeout: Option<Duration>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            system_prompt: CONVERSATIONAL_SYSTEM_PROMPT.to_string(),
            top_k: 3,
            template: PromptTemplate::default(),
            history_window: HistoryWindow::Unbounded,
            generation_timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerSource {
    ExactMatch,
    Generated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub source: AnswerSource,
}

/// Turns a question into either a verbatim stored answer or a completion
/// grounded on retrieved knowledge.
pub struct AnswerResolver {
    store: Arc<KnowledgeStore>,
    client: Arc<dyn GenerationClient>,
    config: ResolverConfig,
}

impl AnswerResolver {
    pub fn new(
        store: Arc<KnowledgeStore>,
        client: Arc<dyn GenerationClient>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            store,
            client,
            config,
        }
    }

    /// Ranked retrieval hits that carry an answer marker, joined in rank order.
    pub fn build_context(&self, question: &str) -> String {
        self.store
            .semantic_search(question, self.config.top_k)
            .into_iter()
            .filter(|hit| hit.text.contains(ANSWER_MARKER))
            .map(|hit| hit.text)
            .collect::<Vec<_>>()
            .join(self.config.template.join.separator())
    }

    /// `[system prompt, *history, user question, context]`. The context message
    /// must stay after the user turn.
    pub fn build_messages(
        &self,
        history: &[ConversationTurn],
        question: &str,
        context: &str,
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 3);
        messages.push(ChatMessage::system(self.config.system_prompt.clone()));
        messages.extend(history.iter().map(ChatMessage::from));
        messages.push(ChatMessage::user(question));
        messages.push(ChatMessage::system(self.config.template.context_message(context)));
        messages
    }

    /// Answers one question and records both turns. On failure the session is
    /// left as it was.
    #[instrument(skip_all, fields(session = %session.id()))]
    pub async fn resolve(&self, session: &mut ConversationSession, question: &str) -> Result<Answer> {
        let answer = match self.store.exact_match(question) {
            Some(text) => {
                info!(question = %preview(question, 60), "Answered from knowledge base");
                Answer {
                    text,
                    source: AnswerSource::ExactMatch,
                }
            }
            None => {
                let context = self.build_context(question);
                let history = session.window(self.config.history_window);
                let messages = self.build_messages(history, question, &context);
                debug!(
                    context_chars = context.len(),
                    history_turns = history.len(),
                    "Delegating to generation"
                );
                let text = self.generate(&messages).await?;
                info!(model = %self.client.model_name(), question = %preview(question, 60), "Generated answer");
                Answer {
                    text,
                    source: AnswerSource::Generated,
                }
            }
        };

        session.append(ConversationTurn::user(question));
        session.append(ConversationTurn::assistant(answer.text.clone()));
        Ok(answer)
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        match self.config.generation_timeout {
            Some(limit) => tokio::time::timeout(limit, self.client.complete(messages))
                .await
                .map_err(|_| ChatError::Timeout(limit))?,
            None => self.client.complete(messages).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::KnowledgeEntry;
    use crate::llm::Role;
    use crate::vector_db::{Metadata, VectorDB};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const KB: &str = r#"{"messages":[{"role":"user","content":"What is your name?"},{"role":"assistant","content":"I'm Ravi."}]}
{"messages":[{"role":"user","content":"Where do you work?"},{"role":"assistant","content":"I worked at Oracle and GW Law."}]}
{"messages":[{"role":"user","content":"What programming languages do you know?"},{"role":"assistant","content":"Python, JavaScript and some Rust."}]}
{"messages":[{"role":"user","content":"What are your hobbies?"},{"role":"assistant","content":"Hiking and photography."}]}
"#;

    #[derive(Default)]
    struct MockClient {
        calls: AtomicUsize,
        last_messages: Mutex<Vec<ChatMessage>>,
        fail: bool,
        delay: Option<Duration>,
    }

    impl MockClient {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_messages(&self) -> Vec<ChatMessage> {
            self.last_messages.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GenerationClient for MockClient {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            *self.last_messages.lock().unwrap() = messages.to_vec();
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(ChatError::Api {
                    status: 500,
                    body: "upstream down".to_string(),
                });
            }
            Ok(format!("generated #{n}"))
        }

        fn model_name(&self) -> &str {
            "mock"
        }
    }

    fn resolver_with(store: KnowledgeStore, client: Arc<MockClient>, config: ResolverConfig) -> AnswerResolver {
        AnswerResolver::new(Arc::new(store), client, config)
    }

    fn resolver(client: Arc<MockClient>) -> AnswerResolver {
        resolver_with(KnowledgeStore::from_jsonl(KB.as_bytes()), client, ResolverConfig::default())
    }

    #[tokio::test]
    async fn exact_match_short_circuits_generation() {
        let client = Arc::new(MockClient::default());
        let resolver = resolver(client.clone());
        let mut session = ConversationSession::new();

        let answer = resolver.resolve(&mut session, "What is your name?").await.unwrap();
        assert_eq!(answer.text, "I'm Ravi.");
        assert_eq!(answer.source, AnswerSource::ExactMatch);
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn case_difference_falls_through_to_generation() {
        let client = Arc::new(MockClient::default());
        let resolver = resolver(client.clone());
        let mut session = ConversationSession::new();

        // No normalisation on the fast path: lowercase misses the stored question.
        let answer = resolver.resolve(&mut session, "what is your name").await.unwrap();
        assert_eq!(answer.source, AnswerSource::Generated);
        assert_eq!(answer.text, "generated #1");
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn context_message_follows_user_turn() {
        let client = Arc::new(MockClient::default());
        let resolver = resolver(client.clone());
        let mut session = ConversationSession::new();
        session.append(ConversationTurn::user("hello"));
        session.append(ConversationTurn::assistant("hi there"));

        resolver.resolve(&mut session, "Which programming languages?").await.unwrap();

        let messages = client.last_messages();
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User, Role::System]
        );
        assert_eq!(messages[3].content, "Which programming languages?");
        assert!(messages[4].content.starts_with("Use this context if relevant:\n"));
        assert!(
            messages[4]
                .content
                .contains("Q: What programming languages do you know?\nA: Python, JavaScript and some Rust.")
        );
    }

    #[test]
    fn context_preserves_rank_order_and_top_k() {
        let resolver = resolver(Arc::new(MockClient::default()));

        let context = resolver.build_context("Which programming languages do you know?");
        let blocks: Vec<&str> = context.split('\n').filter(|l| l.starts_with("Q: ")).collect();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0], "Q: What programming languages do you know?");
    }

    #[test]
    fn single_hit_context_is_formatted_text() {
        let entries = vec![
            KnowledgeEntry {
                id: "0".into(),
                question: "Tell me about Rust".into(),
                answer: "Rust is fun.".into(),
            },
        ];
        let store = KnowledgeStore::from_entries(entries).unwrap();
        let resolver = resolver_with(store, Arc::new(MockClient::default()), ResolverConfig::default());
        assert_eq!(resolver.build_context("Rust"), "Q: Tell me about Rust\nA: Rust is fun.");
    }

    #[test]
    fn context_drops_hits_without_answer_marker() {
        let docs = [
            ("0", "Q: rust clippy lints\nA: run cargo clippy"),
            ("1", "Q: rust clippy lints\nnotes pending"),
            ("2", "Q: rust books\nA: read the rust book"),
        ];
        let mut index = VectorDB::new();
        index
            .add(
                docs.iter().map(|(id, _)| id.to_string()).collect(),
                docs.iter().map(|(_, text)| text.to_string()).collect(),
                docs.iter().map(|_| Metadata::new()).collect(),
            )
            .unwrap();
        let store = KnowledgeStore::from_index(Vec::new(), index);

        let hits = store.semantic_search("rust clippy lints", 3);
        assert!(hits.iter().any(|hit| hit.id == "1"));
        let expected: Vec<String> = hits
            .iter()
            .filter(|hit| hit.id != "1")
            .map(|hit| hit.text.clone())
            .collect();

        let resolver = resolver_with(store, Arc::new(MockClient::default()), ResolverConfig::default());
        let context = resolver.build_context("rust clippy lints");
        assert!(!context.contains("notes pending"));
        assert_eq!(context, expected.join("\n"));
        assert_eq!(expected.len(), 2);
    }

    #[tokio::test]
    async fn empty_store_delegates_every_question() {
        let client = Arc::new(MockClient::default());
        let resolver = resolver_with(KnowledgeStore::empty(), client.clone(), ResolverConfig::default());
        let mut session = ConversationSession::new();

        let answer = resolver.resolve(&mut session, "What is your name?").await.unwrap();
        assert_eq!(answer.source, AnswerSource::Generated);
        assert_eq!(client.calls(), 1);

        let messages = client.last_messages();
        assert_eq!(messages.last().unwrap().content, "Use this context if relevant:\n");
    }

    #[tokio::test]
    async fn guided_template_uses_fallback_for_empty_context() {
        let client = Arc::new(MockClient::default());
        let config = ResolverConfig {
            template: PromptTemplate::for_style(PromptStyle::Guided, ContextJoin::Newline),
            ..ResolverConfig::default()
        };
        let resolver = resolver_with(KnowledgeStore::empty(), client.clone(), config);
        let mut session = ConversationSession::new();

        resolver.resolve(&mut session, "Anything?").await.unwrap();
        assert_eq!(client.last_messages().last().unwrap().content, GUIDED_EMPTY_CONTEXT);
    }

    #[tokio::test]
    async fn history_accumulates_two_turns_per_question() {
        let client = Arc::new(MockClient::default());
        let resolver = resolver(client.clone());
        let mut session = ConversationSession::new();

        let questions = ["What is your name?", "Tell me a joke", "Where do you work?"];
        for q in questions {
            resolver.resolve(&mut session, q).await.unwrap();
        }

        let history = session.history();
        assert_eq!(history.len(), 2 * questions.len());
        assert_eq!(history[0], ConversationTurn::user("What is your name?"));
        assert_eq!(history[1], ConversationTurn::assistant("I'm Ravi."));
        assert_eq!(history[2], ConversationTurn::user("Tell me a joke"));
        assert_eq!(history[3], ConversationTurn::assistant("generated #1"));
        assert_eq!(history[4], ConversationTurn::user("Where do you work?"));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn history_window_limits_forwarded_turns() {
        let client = Arc::new(MockClient::default());
        let config = ResolverConfig {
            history_window: HistoryWindow::Last(2),
            ..ResolverConfig::default()
        };
        let resolver = resolver_with(KnowledgeStore::empty(), client.clone(), config);
        let mut session = ConversationSession::new();

        for q in ["one", "two", "three"] {
            resolver.resolve(&mut session, q).await.unwrap();
        }

        // system + 2 prior turns + user + context
        let messages = client.last_messages();
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[1].content, "two");
        assert_eq!(messages[2].content, "generated #2");
    }

    #[tokio::test]
    async fn generation_failure_propagates_and_leaves_session_untouched() {
        let client = Arc::new(MockClient {
            fail: true,
            ..MockClient::default()
        });
        let resolver = resolver(client.clone());
        let mut session = ConversationSession::new();

        let err = resolver.resolve(&mut session, "Unknown question").await.unwrap_err();
        assert!(matches!(err, ChatError::Api { status: 500, .. }));
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn generation_timeout_is_enforced() {
        let client = Arc::new(MockClient {
            delay: Some(Duration::from_secs(5)),
            ..MockClient::default()
        });
        let config = ResolverConfig {
            generation_timeout: Some(Duration::from_millis(20)),
            ..ResolverConfig::default()
        };
        let resolver = resolver_with(KnowledgeStore::empty(), client, config);
        let mut session = ConversationSession::new();

        let err = resolver.resolve(&mut session, "slow").await.unwrap_err();
        assert!(matches!(err, ChatError::Timeout(_)));
    }
}
