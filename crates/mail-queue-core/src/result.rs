use crate::success_rate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of a delivered single-recipient send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleEmailResult {
    pub recipient: String,
    pub subject: String,
    pub sent_at: DateTime<Utc>,
    pub delivery_confirmed: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentEntry {
    pub email: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedEntry {
    pub email: String,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkSummary {
    pub total_emails: usize,
    pub sent_count: usize,
    pub failed_count: usize,
    /// Percentage with one decimal place
    pub success_rate: f64,
}

/// Aggregate outcome of a bulk send. Every input recipient lands in exactly one list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkEmailResult {
    pub summary: BulkSummary,
    pub sent_emails: Vec<SentEntry>,
    pub failed_emails: Vec<FailedEntry>,
    pub subject: String,
    pub completed_at: DateTime<Utc>,
}

impl BulkEmailResult {
    pub fn new(
        subject: String,
        sent_emails: Vec<SentEntry>,
        failed_emails: Vec<FailedEntry>,
    ) -> Self {
        let total_emails = sent_emails.len() + failed_emails.len();
        BulkEmailResult {
            summary: BulkSummary {
                total_emails,
                sent_count: sent_emails.len(),
                failed_count: failed_emails.len(),
                success_rate: success_rate(sent_emails.len(), total_emails),
            },
            sent_emails,
            failed_emails,
            subject,
            completed_at: Utc::now(),
        }
    }

    pub fn success_rate_label(&self) -> String {
        format!("{:.1}%", self.summary.success_rate)
    }
}

/// Terminal payload stored on a completed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskOutcome {
    SingleEmail(SingleEmailResult),
    BulkEmail(BulkEmailResult),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sent(email: &str) -> SentEntry {
        SentEntry { email: email.to_string(), sent_at: Utc::now() }
    }

    fn failed(email: &str, reason: &str) -> FailedEntry {
        FailedEntry {
            email: email.to_string(),
            reason: reason.to_string(),
            failed_at: Utc::now(),
        }
    }

    #[test]
    fn test_bulk_summary_counts() {
        let result = BulkEmailResult::new(
            "Hi".to_string(),
            vec![sent("a@x.com"), sent("b@x.com")],
            vec![failed("bad", "Invalid email format")],
        );

        assert_eq!(result.summary.total_emails, 3);
        assert_eq!(result.summary.sent_count, 2);
        assert_eq!(result.summary.failed_count, 1);
        assert_eq!(result.summary.success_rate, 66.7);
        assert_eq!(result.success_rate_label(), "66.7%");
    }

    #[test]
    fn test_empty_bulk_has_zero_rate() {
        let result = BulkEmailResult::new("Hi".to_string(), vec![], vec![]);
        assert_eq!(result.summary.total_emails, 0);
        assert_eq!(result.success_rate_label(), "0.0%");
    }

    #[test]
    fn test_outcome_is_tagged_by_kind() {
        let outcome = TaskOutcome::SingleEmail(SingleEmailResult {
            recipient: "a@b.com".to_string(),
            subject: "Hi".to_string(),
            sent_at: Utc::now(),
            delivery_confirmed: true,
            message: "Email sent successfully!".to_string(),
        });

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["kind"], "single_email");
        assert_eq!(json["recipient"], "a@b.com");

        let back: TaskOutcome = serde_json::from_value(json).unwrap();
        assert_eq!(back, outcome);
    }
}
