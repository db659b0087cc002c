//! Turn orchestration for the interview session state machine.
//!
//! One engine serves every session. Each operation is a linear chain of
//! backend calls (generate, evaluate, synthesize) with the session loaded
//! from and written back to the injected store; no session state is
//! mutated until every generation and parse step of the operation has
//! succeeded, so a failed call leaves the open question answerable again.

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::generation::TextGenerator;
use crate::prompts;
use crate::session::{
    CandidateProfile, Evaluation, FinalReport, Level, Session, SessionState,
};
use crate::speech::SpeechSynthesizer;
use crate::store::SessionStore;

/// Caller input for starting an interview.
#[derive(Debug, Clone, Deserialize)]
pub struct StartRequest {
    pub role: String,
    pub level: String,
    pub name: String,
    pub age: u32,
    pub experience_years: f64,
}

impl StartRequest {
    fn validated(self) -> Result<(String, Level, CandidateProfile)> {
        let role = self.role.trim().to_string();
        if role.is_empty() {
            return Err(Error::Validation("role must not be empty".into()));
        }
        let level: Level = self.level.parse()?;
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::Validation("candidate name must not be empty".into()));
        }
        if self.age == 0 {
            return Err(Error::Validation("candidate age must be positive".into()));
        }
        if !self.experience_years.is_finite() || self.experience_years < 0.0 {
            return Err(Error::Validation(
                "experience years must be a non-negative number".into(),
            ));
        }
        Ok((
            role,
            level,
            CandidateProfile {
                name,
                age: self.age,
                experience_years: self.experience_years,
            },
        ))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StartedInterview {
    pub session_id: Uuid,
    pub first_question_text: String,
    /// Base64-encoded audio of the spoken question; empty when synthesis
    /// degraded.
    pub interviewer_audio_base64: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerOutcome {
    pub followup_question_text: String,
    pub evaluation: Evaluation,
    pub interviewer_audio_base64: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InterviewSummary {
    pub final_report: FinalReport,
    pub interviewer_audio_base64: String,
}

/// Sequences the interview phases against the injected backends.
pub struct InterviewEngine {
    generator: Arc<dyn TextGenerator>,
    speech: Arc<dyn SpeechSynthesizer>,
    store: Arc<dyn SessionStore>,
}

impl InterviewEngine {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        speech: Arc<dyn SpeechSynthesizer>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            generator,
            speech,
            store,
        }
    }

    /// Starts an interview: generates the first question, speaks it
    /// best-effort, and persists a fresh session holding one open turn.
    ///
    /// Aborts session creation only if question generation itself fails.
    pub async fn start(&self, request: StartRequest) -> Result<StartedInterview> {
        let (role, level, candidate) = request.validated()?;

        let prompt = prompts::question_prompt(&role, level, 1, &[], &candidate);
        let question = self.generator.generate(&prompt, false).await?;
        let audio = self.synthesize_best_effort(&question, "first question").await;

        let now = Utc::now();
        let session = Session::new(role, level, candidate, question.clone(), now);
        self.store.put(&session).await?;

        tracing::info!(session_id = %session.id, "interview started");
        Ok(StartedInterview {
            session_id: session.id,
            first_question_text: question,
            interviewer_audio_base64: audio,
            started_at: now,
        })
    }

    /// Processes one answer: evaluates it, produces the follow-up
    /// question, speaks it best-effort, then closes the open turn and
    /// appends the next one.
    pub async fn submit_answer(
        &self,
        session_id: Uuid,
        answer_text: &str,
    ) -> Result<AnswerOutcome> {
        let answer = answer_text.trim();
        if answer.is_empty() {
            return Err(Error::Validation("answer text must not be empty".into()));
        }

        let mut session = self.load(session_id).await?;
        if session.state == SessionState::Ended {
            return Err(Error::SessionEnded);
        }
        let open_idx = session
            .open_turn_index()
            .ok_or_else(|| Error::NotFound("no open question awaiting an answer".into()))?;
        let question = session.turns[open_idx].question.clone();

        let eval_prompt = prompts::evaluation_prompt(
            &question,
            answer,
            &session.role,
            session.level,
            &session.turns,
        );
        let raw = self.generator.generate(&eval_prompt, true).await?;
        let evaluation: Evaluation = serde_json::from_str(&raw).map_err(|err| {
            tracing::warn!(payload = %raw, "evaluation payload failed to parse");
            Error::MalformedResponse(format!("evaluation: {err}"))
        })?;
        let evaluation = evaluation.validate()?;

        let followup_prompt = prompts::followup_prompt(
            &question,
            answer,
            &evaluation,
            &session.role,
            session.level,
            &session.turns,
        );
        let followup = self.generator.generate(&followup_prompt, false).await?;
        let audio = self
            .synthesize_best_effort(&followup, "follow-up question")
            .await;

        let now = Utc::now();
        session.record_exchange(answer.to_string(), evaluation.clone(), followup.clone(), now)?;
        self.store.put(&session).await?;

        tracing::info!(
            session_id = %session.id,
            score = evaluation.score,
            intent = evaluation.followup_intent.as_str(),
            turns = session.turns.len(),
            "answer processed"
        );
        Ok(AnswerOutcome {
            followup_question_text: followup,
            evaluation,
            interviewer_audio_base64: audio,
            timestamp: now,
        })
    }

    /// Ends the interview: generates the final scored report over the full
    /// turn history, speaks a closing remark best-effort, and marks the
    /// session terminal.
    pub async fn end(&self, session_id: Uuid) -> Result<InterviewSummary> {
        let mut session = self.load(session_id).await?;
        if session.state == SessionState::Ended {
            return Err(Error::SessionEnded);
        }

        let prompt = prompts::final_report_prompt(
            &session.role,
            session.level,
            &session.turns,
            &session.rubric_scores,
        );
        let raw = self.generator.generate(&prompt, true).await?;
        let report: FinalReport = serde_json::from_str(&raw).map_err(|err| {
            tracing::warn!(payload = %raw, "final report payload failed to parse");
            Error::MalformedResponse(format!("final report: {err}"))
        })?;
        let report = report.validate()?;

        let closing = format!(
            "Thank you for the interview. Your overall score is {:.1} out of 10. {}",
            report.overall_score, report.summary
        );
        let audio = self.synthesize_best_effort(&closing, "closing remark").await;

        session.finish(Utc::now());
        self.store.put(&session).await?;

        tracing::info!(
            session_id = %session.id,
            overall_score = report.overall_score,
            "interview ended"
        );
        Ok(InterviewSummary {
            final_report: report,
            interviewer_audio_base64: audio,
        })
    }

    async fn load(&self, session_id: Uuid) -> Result<Session> {
        self.store
            .get(session_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("unknown session {session_id}")))
    }

    /// Synthesis is best-effort: a failure downgrades to "no audio" and
    /// never blocks delivery of the textual result.
    async fn synthesize_best_effort(&self, text: &str, context: &str) -> String {
        match self.speech.synthesize(text).await {
            Ok(bytes) => general_purpose::STANDARD.encode(bytes),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    context,
                    "speech synthesis failed, continuing without audio"
                );
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::MockTextGenerator;
    use crate::session::FollowupIntent;
    use crate::speech::MockSpeechSynthesizer;
    use crate::store::MemoryStore;

    const EVALUATION_JSON: &str = r#"{
        "score": 8.0,
        "strengths": ["practical approach"],
        "weaknesses": ["little depth"],
        "suggestions": ["mention composite indexes"],
        "missing_topics": ["index types"],
        "followup_intent": "deepen"
    }"#;

    const REPORT_JSON: &str = r#"{
        "overall_score": 8.0,
        "summary": "Solid fundamentals with practical instincts.",
        "rubric_breakdown": [
            {"category": "technical_knowledge", "score": 8.0, "notes": "good"},
            {"category": "problem_solving", "score": 8.0, "notes": "pragmatic"},
            {"category": "communication", "score": 7.5, "notes": "concise"},
            {"category": "experience_relevance", "score": 8.5, "notes": "fits"}
        ],
        "next_steps": ["Practice query planning.", "Review locking."]
    }"#;

    fn start_request() -> StartRequest {
        StartRequest {
            role: "backend".to_string(),
            level: "mid".to_string(),
            name: "Ana".to_string(),
            age: 29,
            experience_years: 3.0,
        }
    }

    fn speaking_mock(times: usize) -> MockSpeechSynthesizer {
        let mut speech = MockSpeechSynthesizer::new();
        speech
            .expect_synthesize()
            .times(times)
            .returning(|_| Box::pin(async { Ok(vec![1u8, 2, 3]) }));
        speech
    }

    fn engine_with(
        generator: MockTextGenerator,
        speech: MockSpeechSynthesizer,
    ) -> (InterviewEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let engine = InterviewEngine::new(
            Arc::new(generator),
            Arc::new(speech),
            store.clone(),
        );
        (engine, store)
    }

    #[tokio::test]
    async fn full_interview_flow() {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .withf(|prompt, require_json| {
                !*require_json && prompt.contains("Interview Stage: 1")
            })
            .once()
            .returning(|_, _| {
                Box::pin(async { Ok("Ana, how would you speed up a slow query?".to_string()) })
            });
        generator
            .expect_generate()
            .withf(|prompt, require_json| {
                *require_json && prompt.contains("Evaluate this interview answer")
            })
            .once()
            .returning(|_, _| Box::pin(async { Ok(EVALUATION_JSON.to_string()) }));
        generator
            .expect_generate()
            .withf(|prompt, require_json| {
                !*require_json && prompt.contains("Generate a follow-up question")
            })
            .once()
            .returning(|_, _| {
                Box::pin(async { Ok("Which index type would you choose, and why?".to_string()) })
            });
        generator
            .expect_generate()
            .withf(|prompt, require_json| {
                *require_json && prompt.contains("Generate a final interview report")
            })
            .once()
            .returning(|_, _| Box::pin(async { Ok(REPORT_JSON.to_string()) }));

        let (engine, store) = engine_with(generator, speaking_mock(3));

        // Start: one open turn, no scores yet, audio delivered.
        let started = engine.start(start_request()).await.expect("start succeeds");
        assert_eq!(
            started.first_question_text,
            "Ana, how would you speed up a slow query?"
        );
        assert!(!started.interviewer_audio_base64.is_empty());

        let session = store
            .get(started.session_id)
            .await
            .unwrap()
            .expect("session persisted");
        assert_eq!(session.turns.len(), 1);
        assert_eq!(session.open_turn_index(), Some(0));
        assert!(session.rubric_scores.is_empty());

        // Submit: score 8.0 resolves to the model's "deepen" intent, the
        // first turn closes, a second open turn appears.
        let outcome = engine
            .submit_answer(started.session_id, "I'd use an index.")
            .await
            .expect("submission succeeds");
        assert_eq!(outcome.evaluation.score, 8.0);
        assert_eq!(outcome.evaluation.followup_intent, FollowupIntent::Deepen);
        assert_eq!(
            outcome.followup_question_text,
            "Which index type would you choose, and why?"
        );

        let session = store.get(started.session_id).await.unwrap().unwrap();
        assert_eq!(session.turns.len(), 2);
        assert_eq!(session.rubric_scores, vec![8.0]);
        assert_eq!(session.turns[0].answer.as_deref(), Some("I'd use an index."));
        assert_eq!(session.open_turn_index(), Some(1));

        // End: four rubric categories, non-empty next steps, terminal state.
        let summary = engine.end(started.session_id).await.expect("end succeeds");
        assert_eq!(summary.final_report.overall_score, 8.0);
        assert_eq!(summary.final_report.rubric_breakdown.len(), 4);
        assert!(!summary.final_report.next_steps.is_empty());

        let session = store.get(started.session_id).await.unwrap().unwrap();
        assert_eq!(session.state, SessionState::Ended);
    }

    #[tokio::test]
    async fn start_survives_speech_synthesis_failure() {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .once()
            .returning(|_, _| Box::pin(async { Ok("First question?".to_string()) }));

        let mut speech = MockSpeechSynthesizer::new();
        speech
            .expect_synthesize()
            .once()
            .returning(|_| Box::pin(async { Err(Error::Transport("voice backend down".into())) }));

        let (engine, _) = engine_with(generator, speech);

        let started = engine.start(start_request()).await.expect("start succeeds");
        assert_eq!(started.first_question_text, "First question?");
        assert_eq!(started.interviewer_audio_base64, "");
    }

    #[tokio::test]
    async fn start_rejects_invalid_input() {
        // No backend call may happen for rejected input.
        let (engine, _) = engine_with(MockTextGenerator::new(), MockSpeechSynthesizer::new());

        let mut missing_role = start_request();
        missing_role.role = "  ".to_string();
        assert!(matches!(
            engine.start(missing_role).await.unwrap_err(),
            Error::Validation(_)
        ));

        let mut bad_level = start_request();
        bad_level.level = "staff".to_string();
        assert!(matches!(
            engine.start(bad_level).await.unwrap_err(),
            Error::Validation(_)
        ));

        let mut unnamed = start_request();
        unnamed.name = String::new();
        assert!(matches!(
            engine.start(unnamed).await.unwrap_err(),
            Error::Validation(_)
        ));
    }

    #[tokio::test]
    async fn submit_answer_to_unknown_session_is_not_found() {
        let (engine, _) = engine_with(MockTextGenerator::new(), MockSpeechSynthesizer::new());

        let err = engine
            .submit_answer(Uuid::new_v4(), "an answer")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn submit_answer_without_open_question_is_not_found() {
        let (engine, store) = engine_with(MockTextGenerator::new(), MockSpeechSynthesizer::new());

        let mut session = Session::new(
            "backend".to_string(),
            Level::Mid,
            CandidateProfile {
                name: "Ana".to_string(),
                age: 29,
                experience_years: 3.0,
            },
            "Q?".to_string(),
            Utc::now(),
        );
        session.turns[0].answer = Some("already answered".to_string());
        session.open_turn = None;
        store.put(&session).await.unwrap();

        let err = engine
            .submit_answer(session.id, "another answer")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        // No mutation happened.
        let stored = store.get(session.id).await.unwrap().unwrap();
        assert_eq!(stored.turns.len(), 1);
        assert!(stored.rubric_scores.is_empty());
    }

    #[tokio::test]
    async fn malformed_evaluation_leaves_the_open_turn_untouched() {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .withf(|_, require_json| !*require_json)
            .once()
            .returning(|_, _| Box::pin(async { Ok("Q1?".to_string()) }));
        generator
            .expect_generate()
            .withf(|_, require_json| *require_json)
            .once()
            .returning(|_, _| {
                Box::pin(async { Ok("The answer was decent overall.".to_string()) })
            });

        let (engine, store) = engine_with(generator, speaking_mock(1));

        let started = engine.start(start_request()).await.unwrap();
        let err = engine
            .submit_answer(started.session_id, "my answer")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));

        // The session is retryable: still one open turn, no score recorded.
        let session = store.get(started.session_id).await.unwrap().unwrap();
        assert_eq!(session.turns.len(), 1);
        assert_eq!(session.open_turn_index(), Some(0));
        assert!(session.rubric_scores.is_empty());
        assert!(session.turns[0].answer.is_none());
    }

    #[tokio::test]
    async fn out_of_range_evaluation_score_is_malformed() {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .withf(|_, require_json| !*require_json)
            .once()
            .returning(|_, _| Box::pin(async { Ok("Q1?".to_string()) }));
        generator
            .expect_generate()
            .withf(|_, require_json| *require_json)
            .once()
            .returning(|_, _| {
                Box::pin(async {
                    Ok(r#"{"score": 11.0, "followup_intent": "deepen"}"#.to_string())
                })
            });

        let (engine, _) = engine_with(generator, speaking_mock(1));

        let started = engine.start(start_request()).await.unwrap();
        let err = engine
            .submit_answer(started.session_id, "my answer")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn model_chosen_next_topic_intent_is_passed_through() {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .withf(|_, require_json| !*require_json)
            .times(2)
            .returning(|_, _| Box::pin(async { Ok("a question".to_string()) }));
        generator
            .expect_generate()
            .withf(|_, require_json| *require_json)
            .once()
            .returning(|_, _| {
                // High score, yet the evaluator judged the topic exhausted.
                Box::pin(async {
                    Ok(r#"{"score": 9.5, "followup_intent": "next_topic"}"#.to_string())
                })
            });

        let (engine, _) = engine_with(generator, speaking_mock(2));

        let started = engine.start(start_request()).await.unwrap();
        let outcome = engine
            .submit_answer(started.session_id, "a thorough answer")
            .await
            .unwrap();
        assert_eq!(outcome.evaluation.followup_intent, FollowupIntent::NextTopic);
    }

    #[tokio::test]
    async fn submitting_after_end_is_rejected() {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .withf(|_, require_json| !*require_json)
            .once()
            .returning(|_, _| Box::pin(async { Ok("Q1?".to_string()) }));
        generator
            .expect_generate()
            .withf(|_, require_json| *require_json)
            .once()
            .returning(|_, _| Box::pin(async { Ok(REPORT_JSON.to_string()) }));

        let (engine, _) = engine_with(generator, speaking_mock(2));

        let started = engine.start(start_request()).await.unwrap();
        engine.end(started.session_id).await.expect("end succeeds");

        assert!(matches!(
            engine
                .submit_answer(started.session_id, "late answer")
                .await
                .unwrap_err(),
            Error::SessionEnded
        ));
        assert!(matches!(
            engine.end(started.session_id).await.unwrap_err(),
            Error::SessionEnded
        ));
    }

    #[tokio::test]
    async fn empty_answer_is_rejected_before_any_backend_call() {
        let (engine, _) = engine_with(MockTextGenerator::new(), MockSpeechSynthesizer::new());

        let err = engine
            .submit_answer(Uuid::new_v4(), "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
