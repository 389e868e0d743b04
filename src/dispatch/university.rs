use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::error::ServiceError;
use crate::protocol::command::DATE_FORMAT;

// ── Records ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSession {
    pub date: NaiveDate,
    pub subject: String,
    #[serde(default)]
    pub room: String,
    #[serde(default)]
    pub start_period: u32,
    #[serde(default)]
    pub periods: u32,
    #[serde(default)]
    pub lecturer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamSession {
    pub date: NaiveDate,
    pub subject: String,
    #[serde(default)]
    pub room: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub seat: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub term: String,
    pub subject: String,
    #[serde(default)]
    pub credits: u32,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub letter: String,
}

/// The university's student REST API.
#[async_trait]
pub trait University: Send + Sync {
    /// Returns a bearer token.
    async fn login(&self, username: &str, password: &str) -> Result<String, ServiceError>;
    async fn fetch_schedule(&self, token: &str, term: Option<&str>) -> Result<Vec<ClassSession>, ServiceError>;
    async fn fetch_exams(&self, token: &str, term: Option<&str>) -> Result<Vec<ExamSession>, ServiceError>;
    async fn fetch_scores(&self, token: &str) -> Result<Vec<ScoreEntry>, ServiceError>;
}

// ── HTTP client ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct LoginResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

pub struct TvuClient {
    client: Client,
    base_url: String,
}

impl TvuClient {
    pub fn new(base_url: &str) -> Result<Self, ServiceError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        token: &str,
        term: Option<&str>,
    ) -> Result<T, ServiceError> {
        let mut url = Url::parse(&format!("{}{path}", self.base_url))
            .map_err(|e| ServiceError::Failed(format!("bad university URL: {e}")))?;
        if let Some(term) = term {
            url.query_pairs_mut().append_pair("term", term);
        }
        debug!(%url, "university request");
        let resp = self.client.get(url.clone()).bearer_auth(token).send().await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(ServiceError::Auth("session expired".to_string()));
        }
        if !resp.status().is_success() {
            return Err(ServiceError::Failed(format!("{url} returned {}", resp.status())));
        }
        let text = resp.text().await?;
        let envelope: Envelope<T> =
            serde_json::from_str(&text).map_err(|e| ServiceError::Response(e.to_string()))?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl University for TvuClient {
    async fn login(&self, username: &str, password: &str) -> Result<String, ServiceError> {
        let resp = self
            .client
            .post(format!("{}/api/auth/login", self.base_url))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;
        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::BAD_REQUEST => {
                Err(ServiceError::Auth("wrong student ID or password".to_string()))
            }
            status if !status.is_success() => {
                Err(ServiceError::Failed(format!("login returned {status}")))
            }
            _ => {
                let body: LoginResponse = resp
                    .json()
                    .await
                    .map_err(|e| ServiceError::Response(e.to_string()))?;
                Ok(body.access_token)
            }
        }
    }

    async fn fetch_schedule(&self, token: &str, term: Option<&str>) -> Result<Vec<ClassSession>, ServiceError> {
        self.get("/api/schedule", token, term).await
    }

    async fn fetch_exams(&self, token: &str, term: Option<&str>) -> Result<Vec<ExamSession>, ServiceError> {
        self.get("/api/exams", token, term).await
    }

    async fn fetch_scores(&self, token: &str) -> Result<Vec<ScoreEntry>, ServiceError> {
        self.get("/api/scores", token, None).await
    }
}

// ── Formatting ────────────────────────────────────────────────────────────────

pub fn format_day(sessions: &[ClassSession], date: NaiveDate) -> String {
    let mut day: Vec<&ClassSession> = sessions.iter().filter(|s| s.date == date).collect();
    let heading = date.format(DATE_FORMAT);
    if day.is_empty() {
        return format!("No classes on {heading}.");
    }
    day.sort_by_key(|s| s.start_period);
    let mut out = format!("Classes on {heading}:");
    for s in day {
        let last = s.start_period + s.periods.saturating_sub(1);
        out.push_str(&format!("\n- Periods {}-{last}: {}", s.start_period, s.subject));
        if !s.room.is_empty() {
            out.push_str(&format!(" | room {}", s.room));
        }
        if !s.lecturer.is_empty() {
            out.push_str(&format!(" | {}", s.lecturer));
        }
    }
    out
}

pub fn format_exams(exams: &[ExamSession], from: NaiveDate) -> String {
    let mut upcoming: Vec<&ExamSession> = exams.iter().filter(|e| e.date >= from).collect();
    if upcoming.is_empty() {
        return "No upcoming exams.".to_string();
    }
    upcoming.sort_by(|a, b| (a.date, &a.start_time).cmp(&(b.date, &b.start_time)));
    let mut out = String::from("Upcoming exams:");
    for e in upcoming {
        out.push_str(&format!("\n- {} {}: {}", e.date.format(DATE_FORMAT), e.start_time, e.subject));
        if !e.room.is_empty() {
            out.push_str(&format!(" | room {}", e.room));
        }
        if !e.seat.is_empty() {
            out.push_str(&format!(" | seat {}", e.seat));
        }
    }
    out
}

pub fn format_scores(scores: &[ScoreEntry], term: Option<&str>) -> String {
    let selected: Vec<&ScoreEntry> = scores
        .iter()
        .filter(|s| term.map_or(true, |t| s.term == t))
        .collect();
    if selected.is_empty() {
        return match term {
            Some(term) => format!("No scores recorded for term {term}."),
            None => "No scores recorded.".to_string(),
        };
    }
    let mut out = String::from("Scores:");
    let mut weighted = 0.0;
    let mut credits = 0;
    for s in &selected {
        let score = s.score.map_or("-".to_string(), |v| format!("{v:.1}"));
        out.push_str(&format!("\n- [{}] {} ({} cr): {score} {}", s.term, s.subject, s.credits, s.letter));
        if let Some(v) = s.score {
            weighted += v * f64::from(s.credits);
            credits += s.credits;
        }
    }
    if credits > 0 {
        out.push_str(&format!("\nWeighted average: {:.2} over {credits} credits", weighted / f64::from(credits)));
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(date: &str, start: u32, subject: &str) -> ClassSession {
        ClassSession {
            date: NaiveDate::parse_from_str(date, DATE_FORMAT).unwrap(),
            subject: subject.to_string(),
            room: "C71.102".to_string(),
            start_period: start,
            periods: 3,
            lecturer: String::new(),
        }
    }

    #[test]
    fn day_is_filtered_and_sorted() {
        let sessions = vec![
            session("2026-10-19", 7, "Networks"),
            session("2026-10-19", 1, "Compilers"),
            session("2026-10-20", 1, "Databases"),
        ];
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        assert_eq!(
            format_day(&sessions, date),
            "Classes on 2026-10-19:\n- Periods 1-3: Compilers | room C71.102\n- Periods 7-9: Networks | room C71.102"
        );
    }

    #[test]
    fn empty_day() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 25).unwrap();
        assert_eq!(format_day(&[], date), "No classes on 2026-10-25.");
    }

    #[test]
    fn scores_average_skips_missing() {
        let scores = vec![
            ScoreEntry { term: "HK1".into(), subject: "A".into(), credits: 3, score: Some(8.0), letter: "B+".into() },
            ScoreEntry { term: "HK1".into(), subject: "B".into(), credits: 2, score: None, letter: String::new() },
            ScoreEntry { term: "HK2".into(), subject: "C".into(), credits: 2, score: Some(6.0), letter: "C".into() },
        ];
        let out = format_scores(&scores, Some("HK1"));
        assert!(out.contains("Weighted average: 8.00 over 3 credits"), "{out}");
        assert!(!out.contains("[HK2]"));
    }

    #[test]
    fn session_json_shape() {
        let s: ClassSession = serde_json::from_str(r#"{"date":"2026-10-19","subject":"OS"}"#).unwrap();
        assert_eq!(s.periods, 0);
        assert_eq!(s.subject, "OS");
    }
}
