use chrono::{DateTime, Utc};
use chrono_tz::Asia::Seoul;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollectionSlot {
    pub time: &'static str,
    pub label: &'static str,
}

/// Cron run times, ascending. Each run lands a few minutes after the exchange publishes.
pub const COLLECTION_SCHEDULE: [CollectionSlot; 5] = [
    CollectionSlot { time: "09:35", label: "1차" },
    CollectionSlot { time: "10:05", label: "2차" },
    CollectionSlot { time: "11:25", label: "3차" },
    CollectionSlot { time: "13:25", label: "4차" },
    CollectionSlot { time: "14:35", label: "5차" },
];

/// After-hours confirmation run.
pub const CONFIRMED_TIME: &str = "18:05";
pub const CONFIRMED_LABEL: &str = "확정";
pub const WAITING_LABEL: &str = "대기";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CollectionRound {
    Confirmed,
    Waiting {
        next_update: &'static str,
    },
    Round {
        round: usize,
        total: usize,
        label: &'static str,
        next_update: &'static str,
    },
}

impl CollectionRound {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Confirmed => CONFIRMED_LABEL,
            Self::Waiting { .. } => WAITING_LABEL,
            Self::Round { label, .. } => *label,
        }
    }

    /// `"3/5"`, `"0/5"` while waiting, `None` once confirmed.
    pub fn round_text(&self) -> Option<String> {
        match self {
            Self::Confirmed => None,
            Self::Waiting { .. } => Some(format!("0/{}", COLLECTION_SCHEDULE.len())),
            Self::Round { round, total, .. } => Some(format!("{}/{}", round, total)),
        }
    }

    pub fn next_update(&self) -> Option<&'static str> {
        match self {
            Self::Confirmed => None,
            Self::Waiting { next_update } | Self::Round { next_update, .. } => Some(*next_update),
        }
    }
}

/// Resolves the round for a figure stamped `updated_at` (e.g. `2026-02-27T13:30:00`).
///
/// Only the `HH:MM` at character offset 11 is looked at and compared as text,
/// so a malformed stamp degrades to some round instead of failing.
pub fn resolve_round(updated_at: &str, is_estimated: bool) -> CollectionRound {
    if !is_estimated {
        return CollectionRound::Confirmed;
    }

    let time: String = updated_at.chars().skip(11).take(5).collect();

    let matched = COLLECTION_SCHEDULE
        .iter()
        .rposition(|slot| time.as_str() >= slot.time);

    let Some(index) = matched else {
        return CollectionRound::Waiting {
            next_update: COLLECTION_SCHEDULE[0].time,
        };
    };

    let next_update = COLLECTION_SCHEDULE
        .get(index + 1)
        .map(|slot| slot.time)
        .unwrap_or(CONFIRMED_TIME);

    CollectionRound::Round {
        round: index + 1,
        total: COLLECTION_SCHEDULE.len(),
        label: COLLECTION_SCHEDULE[index].label,
        next_update,
    }
}

/// Round that today's provisional figures are at, by the Seoul wall clock.
pub fn resolve_now(now: DateTime<Utc>) -> CollectionRound {
    let local = now.with_timezone(&Seoul);
    let stamp = local.format("%Y-%m-%dT%H:%M:%S").to_string();
    let confirmed = local.format("%H:%M").to_string().as_str() >= CONFIRMED_TIME;
    resolve_round(&stamp, !confirmed)
}
