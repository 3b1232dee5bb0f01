use serde::{Deserialize, Serialize};

pub mod badge;
pub mod ledger;
pub mod leaderboard;

#[inline]
const fn default_limit() -> usize {
    10
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}
