//! Orchestration for one research request.
//!
//! `run` drives decompose -> research (one call per subtopic, in order) ->
//! synthesize. Each note is written before the next subtopic starts, so a
//! failure later in the run leaves earlier notes on disk.

use anyhow::anyhow;
use chrono::{Local, NaiveDateTime};
use tracing::{info, instrument, warn};

use crate::core::breakdown::parse_breakdown;
use crate::core::slug::{request_id_base, unique_id};
use crate::core::stage::{StageTracker, Transition};
use crate::core::types::{Breakdown, Report, ResearchNote, ResearchRequest};
use crate::error::PipelineError;
use crate::io::client::{ChatClient, ChatRequest, ChatResponse};
use crate::io::config::{ResearchPaths, ResearcherConfig};
use crate::io::notes::{NoteDraft, NoteStore};
use crate::io::prompt::{DECOMPOSE_SYSTEM, PromptEngine, RESEARCH_SYSTEM, SYNTHESIZE_SYSTEM};
use crate::io::reports::ReportStore;
use crate::io::session_log::{LogEntry, SessionLog};

/// Progress notifications emitted by [`Pipeline::run_with_events`].
#[derive(Debug, Clone, Copy)]
pub enum PipelineEvent<'a> {
    Started {
        request: &'a ResearchRequest,
    },
    Decomposed {
        breakdown: &'a Breakdown,
    },
    Researching {
        position: usize,
        total: usize,
        subtopic: &'a str,
    },
    NoteSaved {
        total: usize,
        note: &'a ResearchNote,
    },
    Synthesizing {
        notes: usize,
    },
    ReportSaved {
        report: &'a Report,
    },
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub request: ResearchRequest,
    pub breakdown: Breakdown,
    pub notes: Vec<ResearchNote>,
    pub report: Report,
}

/// Sequential research pipeline over a single chat client.
pub struct Pipeline<'a, C: ChatClient> {
    client: &'a C,
    config: &'a ResearcherConfig,
    log: &'a SessionLog,
    prompts: PromptEngine,
    notes: NoteStore,
    reports: ReportStore,
}

impl<'a, C: ChatClient> Pipeline<'a, C> {
    pub fn new(
        client: &'a C,
        config: &'a ResearcherConfig,
        paths: &ResearchPaths,
        log: &'a SessionLog,
    ) -> Self {
        Self {
            client,
            config,
            log,
            prompts: PromptEngine::new(config.prompt_budget_bytes),
            notes: NoteStore::new(&paths.notes_dir),
            reports: ReportStore::new(&paths.reports_dir),
        }
    }

    /// Create a request with an id no earlier request has used.
    pub fn begin(&self, topic: &str) -> Result<ResearchRequest, PipelineError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(PipelineError::decomposition(anyhow!("topic is empty")));
        }
        let started_at = now();
        let base = request_id_base(topic, started_at);
        let id = unique_id(&base, |id| {
            self.notes.request_exists(id) || self.reports.report_exists(id)
        })
        .ok_or_else(|| PipelineError::decomposition(anyhow!("no free request id for {base}")))?;

        Ok(ResearchRequest {
            id,
            topic: topic.to_string(),
            started_at,
        })
    }

    /// Ask the model to split the request topic into 2-4 subtopics.
    #[instrument(skip_all, fields(request_id = %request.id))]
    pub fn decompose(&self, request: &ResearchRequest) -> Result<Breakdown, PipelineError> {
        let prompt = self
            .prompts
            .render_decompose(&request.topic)
            .map_err(PipelineError::decomposition)?;
        let response = self
            .call(request, "decompose", DECOMPOSE_SYSTEM, prompt, false)
            .map_err(PipelineError::decomposition)?;
        let breakdown =
            parse_breakdown(&response.content, &request.topic).map_err(PipelineError::decomposition)?;
        info!(
            topic = %breakdown.topic,
            subtopics = breakdown.subtopics.len(),
            "topic decomposed"
        );
        Ok(breakdown)
    }

    /// Research one subtopic with web search and persist the note.
    ///
    /// On error nothing is written.
    #[instrument(skip_all, fields(request_id = %request.id, position = position))]
    pub fn research(
        &self,
        request: &ResearchRequest,
        position: usize,
        subtopic: &str,
    ) -> Result<ResearchNote, PipelineError> {
        let prompt = self
            .prompts
            .render_research(subtopic, &request.topic)
            .map_err(|err| PipelineError::research(subtopic, err))?;
        let response = self
            .call(request, "research", RESEARCH_SYSTEM, prompt, true)
            .map_err(|err| PipelineError::research(subtopic, err))?;
        if response.content.trim().is_empty() {
            return Err(PipelineError::research(
                subtopic,
                anyhow!("model returned an empty response"),
            ));
        }

        let note = self
            .notes
            .write(&NoteDraft {
                request_id: &request.id,
                position,
                subtopic,
                findings: &response.content,
                created_at: now(),
            })
            .map_err(|err| PipelineError::research(subtopic, err))?;
        info!(
            path = %note.path.display(),
            web_searches = response.web_searches,
            sources = note.sources.len(),
            "note saved"
        );
        Ok(note)
    }

    /// Combine the request's notes into one report.
    #[instrument(skip_all, fields(request_id = %request.id, notes = notes.len()))]
    pub fn synthesize(
        &self,
        request: &ResearchRequest,
        topic: &str,
        notes: &[ResearchNote],
    ) -> Result<Report, PipelineError> {
        if notes.is_empty() {
            return Err(PipelineError::synthesis(anyhow!(
                "no research notes available"
            )));
        }
        if let Some(foreign) = notes.iter().find(|n| n.request_id != request.id) {
            return Err(PipelineError::synthesis(anyhow!(
                "note {} belongs to request {}, not {}",
                foreign.path.display(),
                foreign.request_id,
                request.id
            )));
        }

        let prompt = self
            .prompts
            .render_synthesize(topic, notes)
            .map_err(PipelineError::synthesis)?;
        let response = self
            .call(request, "synthesize", SYNTHESIZE_SYSTEM, prompt, false)
            .map_err(PipelineError::synthesis)?;
        if response.content.trim().is_empty() {
            return Err(PipelineError::synthesis(anyhow!(
                "model returned an empty response"
            )));
        }

        let report = self
            .reports
            .write(&request.id, topic, &response.content, notes, now())
            .map_err(PipelineError::synthesis)?;
        info!(path = %report.path.display(), "report saved");
        Ok(report)
    }

    /// Run all stages for `topic`.
    pub fn run(&self, topic: &str) -> Result<RunOutcome, PipelineError> {
        self.run_with_events(topic, |_| {})
    }

    /// Run all stages for `topic`, reporting progress to `on_event`.
    pub fn run_with_events(
        &self,
        topic: &str,
        mut on_event: impl FnMut(PipelineEvent<'_>),
    ) -> Result<RunOutcome, PipelineError> {
        let request = self.begin(topic)?;
        on_event(PipelineEvent::Started { request: &request });
        let mut tracker = StageTracker::new();

        let result = self.run_stages(&request, &mut tracker, &mut on_event);
        if let Err(err) = &result {
            warn!(request_id = %request.id, stage = %err.stage(), "run failed");
            if let Ok(transition) = tracker.fail() {
                self.log_stage(&request, transition, Some(&err.to_string()));
            }
        }
        result
    }

    fn run_stages(
        &self,
        request: &ResearchRequest,
        tracker: &mut StageTracker,
        on_event: &mut impl FnMut(PipelineEvent<'_>),
    ) -> Result<RunOutcome, PipelineError> {
        self.log_message(&format!(
            "[{}] research request: {}",
            request.id, request.topic
        ));

        let breakdown = self.decompose(request)?;
        on_event(PipelineEvent::Decomposed {
            breakdown: &breakdown,
        });
        let detail = breakdown.subtopics.as_slice().join(", ");
        self.advance(request, tracker, Some(&detail));

        let total = breakdown.subtopics.len();
        let mut notes = Vec::with_capacity(total);
        for (idx, subtopic) in breakdown.subtopics.iter().enumerate() {
            let position = idx + 1;
            on_event(PipelineEvent::Researching {
                position,
                total,
                subtopic,
            });
            let note = self.research(request, position, subtopic)?;
            on_event(PipelineEvent::NoteSaved { total, note: &note });
            notes.push(note);
        }
        self.advance(request, tracker, Some(&format!("{} notes", notes.len())));

        on_event(PipelineEvent::Synthesizing { notes: notes.len() });
        let report = self.synthesize(request, &breakdown.topic, &notes)?;
        on_event(PipelineEvent::ReportSaved { report: &report });
        let saved = report.path.display().to_string();
        self.advance(request, tracker, Some(&saved));

        Ok(RunOutcome {
            request: request.clone(),
            breakdown,
            notes,
            report,
        })
    }

    fn call(
        &self,
        request: &ResearchRequest,
        stage: &'static str,
        system: &str,
        prompt: String,
        web_search: bool,
    ) -> anyhow::Result<ChatResponse> {
        let chat = ChatRequest {
            stage,
            system: system.to_string(),
            prompt,
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            web_search,
        };
        let result = self.client.complete(&chat);
        match &result {
            Ok(response) => self.append(&LogEntry::Exchange {
                request_id: &request.id,
                stage,
                prompt: &chat.prompt,
                response: Ok(&response.content),
            }),
            Err(err) => {
                let text = format!("{err:#}");
                self.append(&LogEntry::Exchange {
                    request_id: &request.id,
                    stage,
                    prompt: &chat.prompt,
                    response: Err(&text),
                });
            }
        }
        result
    }

    fn advance(&self, request: &ResearchRequest, tracker: &mut StageTracker, detail: Option<&str>) {
        match tracker.advance() {
            Ok(transition) => self.log_stage(request, transition, detail),
            Err(err) => warn!(request_id = %request.id, error = %err, "stage transition rejected"),
        }
    }

    fn log_stage(&self, request: &ResearchRequest, transition: Transition, detail: Option<&str>) {
        info!(request_id = %request.id, from = %transition.from, to = %transition.to, "stage transition");
        self.append(&LogEntry::Stage {
            request_id: &request.id,
            transition,
            detail,
        });
    }

    fn log_message(&self, text: &str) {
        self.append(&LogEntry::Message(text));
    }

    /// Transcript failures never abort a run.
    fn append(&self, entry: &LogEntry<'_>) {
        if let Err(err) = self.log.append(entry) {
            warn!(error = %format!("{err:#}"), "failed to append session transcript");
        }
    }
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}
