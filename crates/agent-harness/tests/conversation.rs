//! Multi-turn conversation with a document agent over an in-memory project.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use agent_harness::provider::{ScriptedProvider, ScriptedRound};
use agent_harness::{
    Agent, AgentError, AgentType, DisplayName, ParameterSchema, Role, ToolCall, ToolSchema,
    ToolSetBuilder,
};
use serde_json::json;

const REPO_URL: &str = "https://github.com/example/docs-demo";

struct DocsAgent {
    files: BTreeMap<String, String>,
    cache: Mutex<HashMap<String, String>>,
    username: Option<String>,
}

impl DocsAgent {
    fn new(username: Option<&str>) -> Self {
        let files = [
            ("README.md", "# Demo\nA small demo project."),
            ("src/main.rs", "fn main() {}"),
            ("docs/Architecture.md", "Agents call tools."),
        ]
        .into_iter()
        .map(|(path, body)| (path.to_string(), body.to_string()))
        .collect();

        Self {
            files,
            cache: Mutex::new(HashMap::new()),
            username: username.map(String::from),
        }
    }

    fn read(&self, path: &str) -> String {
        let key = path.to_lowercase();
        if let Some(hit) = self.cache.lock().unwrap().get(&key) {
            return hit.clone();
        }

        let found = self
            .files
            .iter()
            .find(|(name, _)| name.to_lowercase() == key)
            .map(|(_, body)| body.clone());
        match found {
            Some(body) => {
                self.cache.lock().unwrap().insert(key, body.clone());
                body
            }
            None => format!("Access denied: File {path} not found."),
        }
    }
}

impl AgentType for DocsAgent {
    type Deps = ();
    type Output = String;

    const SYSTEM_PROMPT: &'static str =
        "You answer questions about the project. Look documents up before answering.";

    fn register_tools(tools: &mut ToolSetBuilder<Self>) {
        tools
            .tool(
                ToolSchema::new("list_files", "List the documents available to you"),
                "Listing files",
                |agent: Arc<DocsAgent>, _call| async move {
                    anyhow::Ok(agent.files.keys().cloned().collect::<Vec<_>>())
                },
            )
            .tool(
                ToolSchema::new("read_file", "Read a document by path")
                    .param(ParameterSchema::required("file_path", "string", "Document path")),
                DisplayName::computed(|args| {
                    let path = args.get_str("file_path")?;
                    let name = path.rsplit('/').next().unwrap_or(path);
                    Ok(format!("Reading file {name}"))
                }),
                |agent: Arc<DocsAgent>, call| async move {
                    anyhow::Ok(agent.read(call.args.get_str("file_path")?))
                },
            )
            .tool(
                ToolSchema::new("create_github_link", "Link to a file on GitHub").param(
                    ParameterSchema::optional("file_path", "string", "File path")
                        .with_default(json!("")),
                ),
                DisplayName::fixed("Creating GitHub link"),
                |_agent, call| async move {
                    let path = call.args.get_str("file_path")?;
                    anyhow::Ok(if path.is_empty() {
                        REPO_URL.to_string()
                    } else {
                        format!("{REPO_URL}/blob/main/{path}")
                    })
                },
            );
    }

    fn instructions(&self) -> Option<String> {
        self.username.as_ref().map(|name| {
            format!("The user is currently logged in as {name}. Use their name from time to time.")
        })
    }
}

#[tokio::test]
async fn test_multi_turn_conversation_reports_and_remembers() {
    let provider = ScriptedProvider::with_rounds([
        ScriptedRound::reply("There are three documents.")
            .tool_call(ToolCall::new("list_files", json!({})).with_id("c1")),
        ScriptedRound::reply("It is a small demo project.")
            .tool_call(ToolCall::new("read_file", json!({"file_path": "readme.md"})).with_id("c2"))
            .tool_call(ToolCall::new("create_github_link", json!({})).with_id("c3")),
        ScriptedRound::reply("Agents call tools.")
            .tool_call(ToolCall::new("read_file", json!(["docs/Architecture.md"])))
            .tool_call(ToolCall::new("read_file", json!({"file_path": "secrets.env"})))
            .concurrent(),
    ]);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();

    let mut agent = Agent::builder(DocsAgent::new(Some("Ada")))
        .provider(Arc::new(provider.clone()))
        .reporter(Arc::new(tx))
        .timezone(-300)
        .build()
        .unwrap();

    let system_prompt = &provider.sessions()[0].system_prompt;
    assert!(system_prompt.starts_with("Always format dates in a nice human format.\n"));
    assert!(system_prompt.ends_with("Use their name from time to time."));

    let first = agent.send_prompt("What can you tell me about?").await.unwrap();
    assert_eq!(first, "There are three documents.");
    assert_eq!(rx.recv().await.as_deref(), Some("Listing files"));

    agent.send_prompt("What is this project?").await.unwrap();
    assert_eq!(rx.recv().await.as_deref(), Some("Reading file readme.md"));
    assert_eq!(rx.recv().await.as_deref(), Some("Creating GitHub link"));

    let runs = provider.runs();
    assert_eq!(runs[1].tool_results[0].output, "# Demo\nA small demo project.");
    assert_eq!(runs[1].tool_results[1].output, REPO_URL);
    assert_eq!(runs[1].history.len(), 4);

    agent.send_prompt("How does it work?").await.unwrap();
    let mut labels = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
    labels.sort();
    assert_eq!(labels, ["Reading file Architecture.md", "Reading file secrets.env"]);

    let third = &provider.runs()[2];
    assert_eq!(third.tool_results[0].output, "Agents call tools.");
    assert_eq!(third.tool_results[1].output, "Access denied: File secrets.env not found.");

    let roles: Vec<_> = agent.history().messages().iter().map(|m| m.role.clone()).collect();
    assert_eq!(roles.iter().filter(|r| **r == Role::User).count(), 3);
    assert_eq!(agent.history().last().unwrap().content, "Agents call tools.");
    assert_eq!(agent.state().cache.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_failed_round_can_be_retried() {
    let provider = ScriptedProvider::with_rounds([
        ScriptedRound::fail("connection reset"),
        ScriptedRound::reply("Hello again."),
    ]);
    let mut agent = Agent::builder(DocsAgent::new(None))
        .provider(Arc::new(provider.clone()))
        .build()
        .unwrap();

    let err = agent.send_prompt("Hello").await.unwrap_err();
    assert!(matches!(err, AgentError::Dispatch { .. }));
    assert!(err.to_string().contains("Hello"));
    assert!(agent.history().is_empty());

    let answer = agent.send_prompt("Hello").await.unwrap();
    assert_eq!(answer, "Hello again.");
    assert_eq!(agent.history().len(), 2);
    assert!(!provider.sessions()[0].system_prompt.contains("logged in"));
}

#[tokio::test]
async fn test_bad_arguments_reach_the_model_as_text() {
    let provider = ScriptedProvider::with_rounds([ScriptedRound::reply("Let me try again.")
        .tool_call(ToolCall::new("read_file", json!({"path": "README.md"})))]);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    let mut agent = Agent::builder(DocsAgent::new(None))
        .provider(Arc::new(provider.clone()))
        .reporter(Arc::new(tx))
        .build()
        .unwrap();

    agent.send_prompt("Read the readme").await.unwrap();

    let result = &provider.runs()[0].tool_results[0];
    assert!(!result.success);
    assert!(result.output.starts_with("Error in tool read_file"));
    assert!(rx.try_recv().is_err());
    assert_eq!(agent.history().len(), 4);
}
