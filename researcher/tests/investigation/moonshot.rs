//! Live checks of decomposition and `$web_search` research replies.

use researcher::core::breakdown::parse_breakdown;
use researcher::core::types::{MAX_SUBTOPICS, MIN_SUBTOPICS};
use researcher::io::client::{ChatClient, ChatRequest, MoonshotClient};
use researcher::io::config::ResearcherConfig;
use researcher::io::prompt::{DECOMPOSE_SYSTEM, PromptEngine, RESEARCH_SYSTEM};
use researcher::pipeline::Pipeline;
use researcher::test_support::TestWorkspace;

fn live_client(config: &ResearcherConfig) -> MoonshotClient {
    dotenvy::dotenv().ok();
    let key = config.api_key().expect("api key");
    MoonshotClient::new(config, key).expect("client")
}

#[test]
#[ignore]
fn decomposition_reply_parses() {
    let config = ResearcherConfig::default();
    let client = live_client(&config);
    let prompts = PromptEngine::new(config.prompt_budget_bytes);

    let response = client
        .complete(&ChatRequest {
            stage: "decompose",
            system: DECOMPOSE_SYSTEM.to_string(),
            prompt: prompts
                .render_decompose("renewable energy trends")
                .expect("render"),
            model: config.model.clone(),
            temperature: config.temperature,
            web_search: false,
        })
        .expect("complete");

    let breakdown = parse_breakdown(&response.content, "renewable energy trends").expect("parse");
    let n = breakdown.subtopics.len();
    assert!((MIN_SUBTOPICS..=MAX_SUBTOPICS).contains(&n), "got {n}");
}

#[test]
#[ignore]
fn research_uses_web_search() {
    let config = ResearcherConfig::default();
    let client = live_client(&config);
    let prompts = PromptEngine::new(config.prompt_budget_bytes);

    let response = client
        .complete(&ChatRequest {
            stage: "research",
            system: RESEARCH_SYSTEM.to_string(),
            prompt: prompts
                .render_research("2024 global solar installations", "renewable energy trends")
                .expect("render"),
            model: config.model.clone(),
            temperature: config.temperature,
            web_search: true,
        })
        .expect("complete");

    assert!(!response.content.trim().is_empty());
    eprintln!("web searches: {}", response.web_searches);
}

#[test]
#[ignore]
fn full_pipeline_produces_report() {
    let ws = TestWorkspace::new().expect("workspace");
    let client = live_client(&ws.config);
    let pipeline = Pipeline::new(&client, &ws.config, &ws.paths, &ws.log);

    let outcome = pipeline.run("renewable energy trends").expect("run");

    assert_eq!(ws.note_files().len(), outcome.notes.len());
    assert_eq!(ws.report_files().len(), 1);
}
