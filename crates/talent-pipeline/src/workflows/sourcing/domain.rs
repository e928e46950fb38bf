use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Title used when neither the structured JD nor the prompts yield one.
pub const UNTITLED_JOB: &str = "Untitled Job";
/// Upper bound on note bullets kept per saved candidate.
pub const MAX_NOTE_BULLETS: usize = 20;
/// Upper bound on the length (in characters) of a single note bullet.
pub const MAX_NOTE_LENGTH: usize = 280;

/// Identifier assigned to a sourcing job by the external service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Lifecycle status reported for a sourcing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Hired,
}

impl JobStatus {
    pub const fn label(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Hired => "hired",
        }
    }

    /// No further polling transition is expected from a terminal status.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Hired
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Structured job description produced upstream. Only the title is read here;
/// every other field is carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredJd {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Search directives sent when creating a job. At least one must be present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPrompts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_prompt: Option<String>,
}

impl SearchPrompts {
    pub fn linkedin(prompt: impl Into<String>) -> Self {
        Self {
            linkedin_prompt: Some(prompt.into()),
            github_prompt: None,
        }
    }

    /// Trim both prompts and drop blank ones; `None` when nothing remains.
    pub fn normalized(&self) -> Option<Self> {
        let clean = |prompt: &Option<String>| {
            prompt
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        let normalized = Self {
            linkedin_prompt: clean(&self.linkedin_prompt),
            github_prompt: clean(&self.github_prompt),
        };
        if normalized.linkedin_prompt.is_none() && normalized.github_prompt.is_none() {
            None
        } else {
            Some(normalized)
        }
    }
}

/// A long-running external candidate search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcingJob {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(default)]
    pub linkedin_prompt: Option<String>,
    #[serde(default)]
    pub github_prompt: Option<String>,
    #[serde(default)]
    pub structured_jd: Option<StructuredJd>,
    #[serde(default)]
    pub candidate_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<NaiveDateTime>,
}

impl SourcingJob {
    pub fn pending(
        job_id: JobId,
        prompts: SearchPrompts,
        structured_jd: Option<StructuredJd>,
    ) -> Self {
        Self {
            job_id,
            status: JobStatus::Pending,
            linkedin_prompt: prompts.linkedin_prompt,
            github_prompt: prompts.github_prompt,
            structured_jd,
            candidate_count: 0,
            created_at: None,
            updated_at: None,
        }
    }

    /// Display title: the structured JD title, else the leading part of the
    /// first prompt up to " with " or " in ", else [`UNTITLED_JOB`].
    pub fn display_title(&self) -> String {
        if let Some(title) = self
            .structured_jd
            .as_ref()
            .and_then(|jd| jd.job_title.as_deref())
            .map(str::trim)
            .filter(|title| !title.is_empty())
        {
            return title.to_string();
        }

        let prompt = self
            .linkedin_prompt
            .as_deref()
            .filter(|prompt| !prompt.trim().is_empty())
            .or(self.github_prompt.as_deref())
            .unwrap_or_default()
            .trim();

        title_from_prompt(prompt).unwrap_or_else(|| UNTITLED_JOB.to_string())
    }
}

fn title_from_prompt(prompt: &str) -> Option<String> {
    if prompt.is_empty() {
        return None;
    }
    // ASCII lowercasing keeps byte offsets aligned with the original text.
    let lower = prompt.to_ascii_lowercase();
    let cut = [" with ", " in "]
        .iter()
        .filter_map(|marker| lower.find(marker))
        .min();
    let title = match cut {
        Some(index) => prompt[..index].trim(),
        None => prompt,
    };
    (!title.is_empty()).then(|| title.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateSource {
    #[serde(alias = "linkedin")]
    LinkedIn,
    #[serde(alias = "github")]
    GitHub,
}

/// Transient search result. `link` identifies the candidate within a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub link: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    pub source: CandidateSource,
    #[serde(default, deserialize_with = "null_as_default")]
    pub match_score: u8,
    #[serde(default, deserialize_with = "null_as_default")]
    pub snippet: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reasoning: String,
}

/// Bullet-point notes. The external store keeps them as one newline-joined
/// string, so (de)serialization goes through that form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Notes(Vec<String>);

impl Notes {
    /// Build notes from raw bullets, dropping blanks and enforcing the caps.
    pub fn from_bullets<I, S>(bullets: I) -> Result<Self, NotesError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let bullets: Vec<String> = bullets
            .into_iter()
            .map(|bullet| strip_marker(bullet.as_ref()).to_string())
            .filter(|bullet| !bullet.is_empty())
            .collect();

        if bullets.len() > MAX_NOTE_BULLETS {
            return Err(NotesError::TooManyBullets {
                count: bullets.len(),
            });
        }
        if let Some((index, bullet)) = bullets
            .iter()
            .enumerate()
            .find(|(_, bullet)| bullet.chars().count() > MAX_NOTE_LENGTH)
        {
            return Err(NotesError::BulletTooLong {
                index,
                length: bullet.chars().count(),
            });
        }
        Ok(Self(bullets))
    }

    /// Lenient parse of stored text; never fails, clamps to the caps.
    fn from_stored(raw: &str) -> Self {
        let bullets = raw
            .lines()
            .map(strip_marker)
            .filter(|bullet| !bullet.is_empty())
            .take(MAX_NOTE_BULLETS)
            .map(|bullet| bullet.chars().take(MAX_NOTE_LENGTH).collect())
            .collect();
        Self(bullets)
    }

    pub fn bullets(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_stored(&self) -> String {
        self.0.join("\n")
    }
}

fn strip_marker(line: &str) -> &str {
    let line = line.trim();
    line.strip_prefix('•')
        .or_else(|| line.strip_prefix('-'))
        .or_else(|| line.strip_prefix('*'))
        .map(str::trim_start)
        .unwrap_or(line)
}

impl Serialize for Notes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.is_empty() {
            serializer.serialize_none()
        } else {
            serializer.serialize_some(&self.to_stored())
        }
    }
}

impl<'de> Deserialize<'de> for Notes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map(|raw| Notes::from_stored(&raw)).unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotesError {
    #[error("notes are limited to {max} bullets (got {count})", max = MAX_NOTE_BULLETS)]
    TooManyBullets { count: usize },
    #[error("note bullet {index} is {length} characters; limit is {max}", max = MAX_NOTE_LENGTH)]
    BulletTooLong { index: usize, length: usize },
}

/// Persisted curation record keyed by (`job_id`, `candidate_link`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedCandidate {
    pub job_id: JobId,
    pub candidate_link: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub rank: Option<u32>,
    #[serde(default)]
    pub notes: Notes,
    #[serde(default, deserialize_with = "null_as_default")]
    pub contacted: bool,
    #[serde(default)]
    pub review: Option<u8>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub linkedin: Option<String>,
    #[serde(default)]
    pub match_score: Option<u8>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub hired: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_file_id: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl SavedCandidate {
    /// Fresh record for a search result; rank and title are filled in on save.
    pub fn from_candidate(job_id: JobId, candidate: &Candidate) -> Self {
        Self {
            job_id,
            candidate_link: candidate.link.clone(),
            name: Some(candidate.name.clone()).filter(|name| !name.is_empty()),
            job_title: None,
            rank: None,
            notes: Notes::default(),
            contacted: false,
            review: None,
            email: None,
            linkedin: (candidate.source == CandidateSource::LinkedIn)
                .then(|| candidate.link.clone()),
            match_score: Some(candidate.match_score.min(100)),
            reasoning: Some(candidate.reasoning.clone()).filter(|text| !text.is_empty()),
            hired: false,
            resume_file_id: None,
        }
    }

    pub fn title(&self) -> &str {
        self.job_title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or(UNTITLED_JOB)
    }
}

/// Contact and review fields editable on a saved candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(default)]
    pub contacted: bool,
    #[serde(default)]
    pub review: Option<u8>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub linkedin: Option<String>,
}

/// Saved candidates of one job title, ordered by rank (unranked last).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobGroup {
    pub title: String,
    pub candidates: Vec<SavedCandidate>,
}

/// A job together with the search results fetched for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobView {
    pub job: SourcingJob,
    pub candidates: Vec<Candidate>,
}
