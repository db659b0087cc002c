//! Interview session data model.
//!
//! A [`Session`] owns the ordered turn history and the running rubric
//! scores. It is mutated only by the engine, and only after a full
//! generate-evaluate-followup exchange has succeeded. The turn currently
//! awaiting an answer is tracked by an explicit index rather than by
//! scanning the history for an unanswered entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Seniority band the interview is calibrated to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Junior,
    Mid,
    Senior,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Junior => "junior",
            Level::Mid => "mid",
            Level::Senior => "senior",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Level {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "junior" => Ok(Level::Junior),
            "mid" => Ok(Level::Mid),
            "senior" => Ok(Level::Senior),
            other => Err(Error::Validation(format!(
                "unknown level '{other}', expected one of junior, mid, senior"
            ))),
        }
    }
}

/// Who is being interviewed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub name: String,
    pub age: u32,
    pub experience_years: f64,
}

/// Direction the next question should take, chosen by the evaluator.
///
/// The engine never derives this value itself; the model's tag is passed
/// through verbatim to the follow-up prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowupIntent {
    Deepen,
    Clarify,
    Simplify,
    NextTopic,
}

impl FollowupIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            FollowupIntent::Deepen => "deepen",
            FollowupIntent::Clarify => "clarify",
            FollowupIntent::Simplify => "simplify",
            FollowupIntent::NextTopic => "next_topic",
        }
    }
}

/// The evaluator's verdict on a single answer. Immutable once attached to
/// a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub score: f64,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub missing_topics: Vec<String>,
    pub followup_intent: FollowupIntent,
}

impl Evaluation {
    /// Checks the ranges the model is instructed to respect and rounds the
    /// score to the one-decimal precision the rubric uses. Enum membership
    /// of `followup_intent` is already enforced during deserialization.
    pub fn validate(mut self) -> Result<Self> {
        self.score = checked_score(self.score, "evaluation score")?;
        Ok(self)
    }
}

/// Fixed rubric categories of the final report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RubricCategory {
    TechnicalKnowledge,
    ProblemSolving,
    Communication,
    ExperienceRelevance,
}

impl RubricCategory {
    pub const ALL: [RubricCategory; 4] = [
        RubricCategory::TechnicalKnowledge,
        RubricCategory::ProblemSolving,
        RubricCategory::Communication,
        RubricCategory::ExperienceRelevance,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RubricEntry {
    pub category: RubricCategory,
    pub score: f64,
    pub notes: String,
}

/// Terminal artifact of a session. Created once at interview end, never
/// mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalReport {
    pub overall_score: f64,
    pub summary: String,
    pub rubric_breakdown: Vec<RubricEntry>,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

impl FinalReport {
    /// Checks score ranges and requires each of the four rubric categories
    /// to appear exactly once.
    pub fn validate(mut self) -> Result<Self> {
        self.overall_score = checked_score(self.overall_score, "overall score")?;
        for entry in &mut self.rubric_breakdown {
            entry.score = checked_score(entry.score, "rubric score")?;
        }
        for category in RubricCategory::ALL {
            let count = self
                .rubric_breakdown
                .iter()
                .filter(|entry| entry.category == category)
                .count();
            if count != 1 {
                return Err(Error::MalformedResponse(format!(
                    "rubric breakdown must contain each category exactly once, \
                     found {count} entries for {category:?}"
                )));
            }
        }
        Ok(self)
    }
}

/// One question/answer/evaluation unit. `answer: None` marks the turn as
/// open, i.e. awaiting the candidate's answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub answer: Option<String>,
    pub evaluation: Option<Evaluation>,
    pub asked_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
}

impl Turn {
    pub fn open(question: String, asked_at: DateTime<Utc>) -> Self {
        Self {
            question,
            answer: None,
            evaluation: None,
            asked_at,
            answered_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.answer.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    AwaitingAnswer,
    Ended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub role: String,
    pub level: Level,
    pub candidate: CandidateProfile,
    pub turns: Vec<Turn>,
    /// Index of the turn currently awaiting an answer, kept in lockstep
    /// with `turns`.
    pub open_turn: Option<usize>,
    pub rubric_scores: Vec<f64>,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    /// Creates a session holding its first, still-open question.
    pub fn new(
        role: String,
        level: Level,
        candidate: CandidateProfile,
        first_question: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            level,
            candidate,
            turns: vec![Turn::open(first_question, now)],
            open_turn: Some(0),
            rubric_scores: Vec::new(),
            state: SessionState::AwaitingAnswer,
            started_at: now,
            last_activity: now,
        }
    }

    /// Index of the turn awaiting an answer, if the pointer still refers
    /// to an unanswered turn.
    pub fn open_turn_index(&self) -> Option<usize> {
        self.open_turn
            .filter(|&idx| self.turns.get(idx).is_some_and(Turn::is_open))
    }

    /// Closes the open turn with the candidate's answer and its evaluation,
    /// appends a new open turn for the follow-up question, and records the
    /// evaluation score. The open-turn pointer moves atomically with the
    /// turn-list mutation.
    pub fn record_exchange(
        &mut self,
        answer: String,
        evaluation: Evaluation,
        followup_question: String,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let idx = self
            .open_turn_index()
            .ok_or_else(|| Error::NotFound("no open question awaiting an answer".into()))?;

        self.rubric_scores.push(evaluation.score);
        let turn = &mut self.turns[idx];
        turn.answer = Some(answer);
        turn.evaluation = Some(evaluation);
        turn.answered_at = Some(now);

        self.turns.push(Turn::open(followup_question, now));
        self.open_turn = Some(self.turns.len() - 1);
        self.last_activity = now;
        Ok(())
    }

    /// Marks the session terminal. The last question, if still open, stays
    /// in the history but can no longer be answered.
    pub fn finish(&mut self, now: DateTime<Utc>) {
        self.state = SessionState::Ended;
        self.open_turn = None;
        self.last_activity = now;
    }
}

/// Rejects scores outside [0, 10] and rounds in-range values to one
/// decimal place.
fn checked_score(score: f64, what: &str) -> Result<f64> {
    if !score.is_finite() || !(0.0..=10.0).contains(&score) {
        return Err(Error::MalformedResponse(format!(
            "{what} {score} is outside the 0-10 range"
        )));
    }
    Ok((score * 10.0).round() / 10.0)
}
