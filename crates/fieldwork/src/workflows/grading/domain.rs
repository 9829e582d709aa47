use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::classifier::PolicyKind;
use super::metrics::{EvaluationStats, PerformanceMetrics};
use crate::workflows::escalation::TaskId;
use crate::workflows::notifications::{DeviceToken, RecipientId};

/// Identifier wrapper for contractors ("workers").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContractorId(pub String);

impl fmt::Display for ContractorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&ContractorId> for RecipientId {
    fn from(value: &ContractorId) -> Self {
        RecipientId(value.0.clone())
    }
}

/// Discrete performance category. Ordering follows rank: `Standard` is lowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Standard,
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl Tier {
    /// Every tier, highest first.
    pub const DESCENDING: [Tier; 5] = [
        Tier::Platinum,
        Tier::Gold,
        Tier::Silver,
        Tier::Bronze,
        Tier::Standard,
    ];

    pub fn lowest() -> Self {
        Tier::Standard
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tier::Standard => "Standard",
            Tier::Bronze => "Bronze",
            Tier::Silver => "Silver",
            Tier::Gold => "Gold",
            Tier::Platinum => "Platinum",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Tier::DESCENDING
            .into_iter()
            .find(|tier| tier.label().eq_ignore_ascii_case(raw.trim()))
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Customer review of a finished job. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub id: String,
    pub contractor_id: ContractorId,
    /// Category name to raw score, nominally 0–5.
    #[serde(default)]
    pub category_scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub overall_score: Option<f64>,
    #[serde(default)]
    pub would_recommend: Option<bool>,
    pub created_at: DateTime<Utc>,
}

/// Completion facts for one finished task, used for responsiveness and punctuality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCompletion {
    pub task_id: TaskId,
    pub contractor_id: ContractorId,
    /// Minutes between the job being offered and the contractor accepting it.
    pub response_minutes: f64,
    pub completed_on_time: bool,
    pub completed_at: DateTime<Utc>,
}

/// One entry of the append-only tier history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierChange {
    pub from: Tier,
    pub to: Tier,
    pub at: DateTime<Utc>,
    /// Average rating at the moment of the transition.
    pub score: f64,
}

impl TierChange {
    pub fn is_upgrade(&self) -> bool {
        self.to > self.from
    }
}

/// Persisted contractor projection. `tier` and `stats` are caches over the evaluation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contractor {
    pub id: ContractorId,
    pub display_name: String,
    pub tier: Tier,
    pub stats: EvaluationStats,
    pub completed_jobs: u32,
    pub tier_history: Vec<TierChange>,
    pub notification_targets: Vec<DeviceToken>,
    /// Optimistic concurrency token; bumped on every committed write.
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl Contractor {
    pub fn new(id: ContractorId, display_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            tier: Tier::lowest(),
            stats: EvaluationStats::default(),
            completed_jobs: 0,
            tier_history: Vec::new(),
            notification_targets: Vec::new(),
            version: 0,
            updated_at: now,
        }
    }

    pub fn view(&self) -> ContractorView {
        ContractorView {
            contractor_id: self.id.clone(),
            display_name: self.display_name.clone(),
            tier: self.tier,
            average_score: self.stats.average_score,
            total_evaluations: self.stats.total_evaluations,
            completed_jobs: self.completed_jobs,
            transitions: self.tier_history.len(),
            last_transition: self.tier_history.last().cloned(),
        }
    }
}

/// Sanitized representation exposed over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractorView {
    pub contractor_id: ContractorId,
    pub display_name: String,
    pub tier: Tier,
    pub average_score: f64,
    pub total_evaluations: u64,
    pub completed_jobs: u32,
    pub transitions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition: Option<TierChange>,
}

/// Immutable record of the evidence behind a tier change, kept for disputes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeAuditEntry {
    pub id: Uuid,
    pub contractor_id: ContractorId,
    pub from: Tier,
    pub to: Tier,
    pub at: DateTime<Utc>,
    pub policy: PolicyKind,
    pub score: f64,
    pub metrics: PerformanceMetrics,
    pub notes: Vec<String>,
}

/// Caller identity, resolved upstream by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Admin,
    Staff,
    Contractor,
    Customer,
}

impl ActorRole {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "staff" => Some(Self::Staff),
            "contractor" | "worker" => Some(Self::Contractor),
            "customer" => Some(Self::Customer),
            _ => None,
        }
    }
}

impl Actor {
    pub fn can_recompute_grades(&self) -> bool {
        self.role == ActorRole::Admin
    }

    pub fn can_run_escalation(&self) -> bool {
        matches!(self.role, ActorRole::Admin | ActorRole::Staff)
    }

    /// Onboarding contractors and posting tasks.
    pub fn can_manage_records(&self) -> bool {
        matches!(self.role, ActorRole::Admin | ActorRole::Staff)
    }
}

/// Selection of contractors for administrator-initiated recomputation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractorFilter {
    #[serde(default)]
    pub tier: Option<Tier>,
    #[serde(default)]
    pub min_average_score: Option<f64>,
    #[serde(default)]
    pub max_average_score: Option<f64>,
}

impl ContractorFilter {
    pub fn matches(&self, contractor: &Contractor) -> bool {
        if let Some(tier) = self.tier {
            if contractor.tier != tier {
                return false;
            }
        }
        if let Some(min) = self.min_average_score {
            if contractor.stats.average_score < min {
                return false;
            }
        }
        if let Some(max) = self.max_average_score {
            if contractor.stats.average_score > max {
                return false;
            }
        }
        true
    }
}
