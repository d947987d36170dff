//! Chat-completion client abstraction.
//!
//! The [`ChatClient`] trait decouples the pipeline from the remote model
//! (currently Moonshot's OpenAI-compatible endpoint). Tests use scripted clients
//! that return predetermined replies without touching the network.

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use crate::io::config::ResearcherConfig;

/// Name of Moonshot's builtin web-search tool.
const WEB_SEARCH_TOOL: &str = "$web_search";

/// Parameters for one chat completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /// Pipeline stage issuing the request, for logs.
    pub stage: &'static str,
    /// System instruction.
    pub system: String,
    /// User prompt.
    pub prompt: String,
    pub model: String,
    pub temperature: f32,
    /// Let the model ground its answer with web search.
    pub web_search: bool,
}

/// Final assistant reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatResponse {
    pub content: String,
    /// Number of `$web_search` round-trips performed.
    pub web_searches: u32,
}

/// Abstraction over chat-completion backends.
pub trait ChatClient {
    /// Send the request and return the final assistant reply.
    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl WireMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "default_tool_type")]
    kind: String,
    function: WireFunction,
}

fn default_tool_type() -> String {
    "builtin_function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [WireMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CompletionReply {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    finish_reason: Option<String>,
    message: WireMessage,
}

/// What the conversation loop should do after one reply.
#[derive(Debug, PartialEq)]
enum Turn {
    /// Final answer.
    Answer(String),
    /// Echo these tool calls back and ask again.
    ToolCalls(WireMessage),
}

/// Client for Moonshot's OpenAI-compatible chat-completions API.
pub struct MoonshotClient {
    http: Client,
    endpoint: String,
    api_key: String,
    max_tool_turns: u32,
}

impl MoonshotClient {
    pub fn new(config: &ResearcherConfig, api_key: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            max_tool_turns: config.max_tool_turns,
        })
    }

    fn post(&self, body: &CompletionBody<'_>) -> Result<CompletionReply> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .with_context(|| format!("send request to {}", self.endpoint))?;

        let status = response.status();
        let text = response.text().context("read response body")?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "chat completion rejected");
            return Err(anyhow!(
                "api returned {}: {}",
                status,
                truncate_for_error(&text, 500)
            ));
        }
        serde_json::from_str(&text).context("parse chat completion response")
    }
}

impl ChatClient for MoonshotClient {
    #[instrument(skip_all, fields(stage = request.stage, model = %request.model, web_search = request.web_search))]
    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        info!("sending chat completion");
        let mut messages = vec![
            WireMessage::text("system", &request.system),
            WireMessage::text("user", &request.prompt),
        ];
        let tools = request.web_search.then(web_search_tools);
        let mut web_searches = 0u32;

        loop {
            let body = CompletionBody {
                model: &request.model,
                messages: &messages,
                temperature: request.temperature,
                tools: tools.clone(),
            };
            let reply = self.post(&body)?;
            match classify_reply(reply)? {
                Turn::Answer(content) => {
                    debug!(web_searches, chars = content.len(), "chat completion finished");
                    return Ok(ChatResponse {
                        content,
                        web_searches,
                    });
                }
                Turn::ToolCalls(assistant) => {
                    if web_searches >= self.max_tool_turns {
                        return Err(anyhow!(
                            "model kept requesting tools after {} turns",
                            self.max_tool_turns
                        ));
                    }
                    web_searches += 1;
                    debug!(turn = web_searches, "echoing web search tool calls");
                    let echoes = tool_echoes(&assistant)?;
                    messages.push(assistant);
                    messages.extend(echoes);
                }
            }
        }
    }
}

fn web_search_tools() -> Value {
    json!([{
        "type": "builtin_function",
        "function": { "name": WEB_SEARCH_TOOL },
    }])
}

fn classify_reply(reply: CompletionReply) -> Result<Turn> {
    let choice = reply
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("response has no choices"))?;
    let wants_tools = choice.finish_reason.as_deref() == Some("tool_calls")
        && choice
            .message
            .tool_calls
            .as_ref()
            .is_some_and(|calls| !calls.is_empty());
    if wants_tools {
        return Ok(Turn::ToolCalls(choice.message));
    }
    Ok(Turn::Answer(choice.message.content.unwrap_or_default()))
}

/// Build the `tool` messages that hand builtin search arguments back to the model.
///
/// The builtin search runs server-side; the client only echoes the arguments.
fn tool_echoes(assistant: &WireMessage) -> Result<Vec<WireMessage>> {
    let calls = assistant.tool_calls.as_deref().unwrap_or_default();
    calls
        .iter()
        .map(|call| {
            if call.function.name != WEB_SEARCH_TOOL {
                return Err(anyhow!("model requested unknown tool {}", call.function.name));
            }
            Ok(WireMessage {
                role: "tool".to_string(),
                content: Some(call.function.arguments.clone()),
                tool_calls: None,
                tool_call_id: Some(call.id.clone()),
                name: Some(call.function.name.clone()),
            })
        })
        .collect()
}

fn truncate_for_error(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{head}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(value: Value) -> CompletionReply {
        serde_json::from_value(value).expect("reply json")
    }

    #[test]
    fn classify_returns_answer_on_stop() {
        let turn = classify_reply(reply(json!({
            "choices": [{
                "finish_reason": "stop",
                "message": { "role": "assistant", "content": "findings" }
            }]
        })))
        .expect("classify");
        assert_eq!(turn, Turn::Answer("findings".to_string()));
    }

    #[test]
    fn classify_treats_null_content_as_empty_answer() {
        let turn = classify_reply(reply(json!({
            "choices": [{
                "finish_reason": "stop",
                "message": { "role": "assistant", "content": null }
            }]
        })))
        .expect("classify");
        assert_eq!(turn, Turn::Answer(String::new()));
    }

    #[test]
    fn classify_errors_without_choices() {
        let err = classify_reply(reply(json!({ "choices": [] }))).unwrap_err();
        assert!(err.to_string().contains("no choices"));
    }

    #[test]
    fn tool_calls_are_echoed_back() {
        let turn = classify_reply(reply(json!({
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {
                    "role": "assistant",
                    "content": "",
                    "tool_calls": [{
                        "id": "call-1",
                        "type": "builtin_function",
                        "function": {
                            "name": "$web_search",
                            "arguments": "{\"search_result\":{\"search_id\":\"abc\"}}"
                        }
                    }]
                }
            }]
        })))
        .expect("classify");
        let Turn::ToolCalls(assistant) = turn else {
            panic!("expected tool calls");
        };
        let echoes = tool_echoes(&assistant).expect("echoes");
        assert_eq!(echoes.len(), 1);
        assert_eq!(echoes[0].role, "tool");
        assert_eq!(echoes[0].tool_call_id.as_deref(), Some("call-1"));
        assert_eq!(echoes[0].name.as_deref(), Some("$web_search"));
        assert_eq!(
            echoes[0].content.as_deref(),
            Some("{\"search_result\":{\"search_id\":\"abc\"}}")
        );
    }

    #[test]
    fn unknown_tool_is_rejected() {
        let assistant = WireMessage {
            role: "assistant".to_string(),
            content: None,
            tool_calls: Some(vec![WireToolCall {
                id: "call-1".to_string(),
                kind: "function".to_string(),
                function: WireFunction {
                    name: "rm_rf".to_string(),
                    arguments: "{}".to_string(),
                },
            }]),
            tool_call_id: None,
            name: None,
        };
        let err = tool_echoes(&assistant).unwrap_err();
        assert!(err.to_string().contains("unknown tool rm_rf"));
    }

    #[test]
    fn request_body_declares_web_search_only_when_asked() {
        let messages = vec![WireMessage::text("user", "hi")];
        let with_tools = serde_json::to_value(CompletionBody {
            model: "moonshot-v1-auto",
            messages: &messages,
            temperature: 0.3,
            tools: Some(web_search_tools()),
        })
        .expect("serialize");
        assert_eq!(
            with_tools["tools"][0]["function"]["name"],
            json!("$web_search")
        );
        assert!(with_tools["messages"][0].get("tool_calls").is_none());

        let without = serde_json::to_value(CompletionBody {
            model: "moonshot-v1-auto",
            messages: &messages,
            temperature: 0.3,
            tools: None,
        })
        .expect("serialize");
        assert!(without.get("tools").is_none());
    }

    #[test]
    fn client_endpoint_trims_trailing_slash() {
        let cfg = ResearcherConfig {
            base_url: "https://api.moonshot.cn/v1/".to_string(),
            ..ResearcherConfig::default()
        };
        let client = MoonshotClient::new(&cfg, "key".to_string()).expect("client");
        assert_eq!(client.endpoint, "https://api.moonshot.cn/v1/chat/completions");
    }

    mod http {
        use std::io::{Read, Write};
        use std::net::{TcpListener, TcpStream};
        use std::thread::{self, JoinHandle};

        use super::*;

        /// Request seen by the stub: lowercased head and parsed JSON body.
        struct Seen {
            head: String,
            body: Value,
        }

        /// Serve `replies` in order, one connection each, on a local port.
        fn serve(replies: Vec<(u16, String)>) -> (String, JoinHandle<Vec<Seen>>) {
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
            let addr = listener.local_addr().expect("local addr");
            let handle = thread::spawn(move || {
                let mut seen = Vec::new();
                for (status, body) in replies {
                    let (mut stream, _) = listener.accept().expect("accept");
                    seen.push(read_request(&mut stream));
                    let response = format!(
                        "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    stream.write_all(response.as_bytes()).expect("write response");
                }
                seen
            });
            (format!("http://{addr}/v1"), handle)
        }

        fn read_request(stream: &mut TcpStream) -> Seen {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let head_end = loop {
                let n = stream.read(&mut chunk).expect("read request");
                assert!(n > 0, "connection closed before headers");
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };
            let head = String::from_utf8_lossy(&buf[..head_end]).to_lowercase();
            let len: usize = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .map(|v| v.trim().parse().expect("content length"))
                .unwrap_or(0);
            while buf.len() < head_end + len {
                let n = stream.read(&mut chunk).expect("read body");
                assert!(n > 0, "connection closed before body");
                buf.extend_from_slice(&chunk[..n]);
            }
            let body = serde_json::from_slice(&buf[head_end..head_end + len]).expect("json body");
            Seen { head, body }
        }

        fn client(base_url: String) -> MoonshotClient {
            let cfg = ResearcherConfig {
                base_url,
                max_tool_turns: 2,
                request_timeout_secs: 10,
                ..ResearcherConfig::default()
            };
            MoonshotClient::new(&cfg, "test-key".to_string()).expect("client")
        }

        fn research_request() -> ChatRequest {
            ChatRequest {
                stage: "research",
                system: "system".to_string(),
                prompt: "Subtopic: solar".to_string(),
                model: "moonshot-v1-auto".to_string(),
                temperature: 0.3,
                web_search: true,
            }
        }

        fn tool_call_reply(id: &str) -> String {
            json!({
                "choices": [{
                    "finish_reason": "tool_calls",
                    "message": {
                        "role": "assistant",
                        "content": "",
                        "tool_calls": [{
                            "id": id,
                            "type": "builtin_function",
                            "function": {
                                "name": "$web_search",
                                "arguments": "{\"query\":\"solar\"}"
                            }
                        }]
                    }
                }]
            })
            .to_string()
        }

        fn answer_reply(content: &str) -> String {
            json!({
                "choices": [{
                    "finish_reason": "stop",
                    "message": { "role": "assistant", "content": content }
                }]
            })
            .to_string()
        }

        #[test]
        fn web_search_round_trip_returns_final_answer() {
            let (base_url, server) = serve(vec![
                (200, tool_call_reply("call-1")),
                (200, answer_reply("solar findings")),
            ]);

            let response = client(base_url)
                .complete(&research_request())
                .expect("complete");
            let seen = server.join().expect("server");

            assert_eq!(
                response,
                ChatResponse {
                    content: "solar findings".to_string(),
                    web_searches: 1
                }
            );
            assert_eq!(seen.len(), 2);
            assert!(seen[0].head.starts_with("post /v1/chat/completions"));
            assert!(seen[0].head.contains("authorization: bearer test-key"));
            assert_eq!(
                seen[0].body["tools"][0]["function"]["name"],
                json!("$web_search")
            );

            let messages = seen[1].body["messages"].as_array().expect("messages");
            let roles: Vec<&str> = messages
                .iter()
                .map(|m| m["role"].as_str().unwrap_or_default())
                .collect();
            assert_eq!(roles, vec!["system", "user", "assistant", "tool"]);
            assert_eq!(messages[3]["tool_call_id"], json!("call-1"));
            assert_eq!(messages[3]["name"], json!("$web_search"));
            assert_eq!(messages[3]["content"], json!("{\"query\":\"solar\"}"));
        }

        #[test]
        fn endless_tool_calls_stop_at_max_tool_turns() {
            let (base_url, server) = serve(vec![
                (200, tool_call_reply("call-1")),
                (200, tool_call_reply("call-2")),
                (200, tool_call_reply("call-3")),
            ]);

            let err = client(base_url)
                .complete(&research_request())
                .unwrap_err();
            let seen = server.join().expect("server");

            assert!(err.to_string().contains("after 2 turns"), "{err:#}");
            assert_eq!(seen.len(), 3);
        }

        #[test]
        fn non_success_status_surfaces_body() {
            let (base_url, server) = serve(vec![(
                401,
                json!({ "error": { "message": "invalid api key" } }).to_string(),
            )]);

            let err = client(base_url)
                .complete(&research_request())
                .unwrap_err();
            server.join().expect("server");

            let text = format!("{err:#}");
            assert!(text.contains("api returned 401"), "{text}");
            assert!(text.contains("invalid api key"), "{text}");
        }

        #[test]
        fn unparseable_body_is_an_error() {
            let (base_url, server) = serve(vec![(200, "not json".to_string())]);

            let err = client(base_url)
                .complete(&research_request())
                .unwrap_err();
            server.join().expect("server");

            assert!(format!("{err:#}").contains("parse chat completion response"));
        }
    }
}
