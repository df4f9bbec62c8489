use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Every ticket line is four distinct numbers.
pub const NUMBERS_PER_LINE: usize = 4;
pub const MIN_NUMBER: u8 = 1;
pub const MAX_NUMBER: u8 = 32;

/// Up to this many distinct users win the lucky dip each draw.
pub const LUCKY_DIP_WINNERS: usize = 5;

/// `matches` value recorded for a jackpot result.
pub const JACKPOT_MATCHES: i64 = 4;
/// `matches` sentinel recorded for a lucky-dip result.
pub const LUCKY_DIP_MATCHES: i64 = 0;

pub const NEXT_DRAW_DATE_KEY: &str = "next_draw_date";

pub type Numbers = [u8; NUMBERS_PER_LINE];

// Store rows

#[derive(Debug, Clone, Serialize)]
pub struct DrawRow {
    pub id: i64,
    pub draw_date: String,
    pub numbers: Numbers,
    pub jackpot_pence: i64,
    pub lucky_dip_prize_pence: i64,
    pub random_data: String,
    pub signature: String,
    pub is_test: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewDraw {
    pub draw_date: String,
    pub numbers: Numbers,
    pub jackpot_pence: i64,
    pub lucky_dip_prize_pence: i64,
    pub random_data: String,
    pub signature: String,
    pub is_test: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryRow {
    pub id: i64,
    pub user_id: String,
    pub numbers: Numbers,
    pub line_number: i64,
    pub is_active: bool,
    pub subscription_id: Option<String>,
    pub payment_ref: Option<String>,
    pub draw_date: String,
}

#[derive(Debug, Clone)]
pub struct NewEntry {
    pub user_id: String,
    pub numbers: Numbers,
    pub line_number: i64,
    pub subscription_id: Option<String>,
    pub payment_ref: Option<String>,
    pub draw_date: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultRow {
    pub id: i64,
    pub draw_id: i64,
    pub user_id: String,
    pub entry_id: i64,
    pub matches: i64,
    pub prize_pence: i64,
    pub is_winner: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettingRow {
    pub key: String,
    pub value: String,
    pub version: i64,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionRow {
    pub id: i64,
    pub user_id: String,
    pub external_id: String,
    pub customer_id: String,
    pub lines: Vec<Numbers>,
    pub status: String,
    pub created_at: String,
    pub canceled_at: Option<String>,
}

// Winner determination

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrizeKind {
    Jackpot,
    LuckyDip,
}

impl PrizeKind {
    pub fn matches(self) -> i64 {
        match self {
            PrizeKind::Jackpot => JACKPOT_MATCHES,
            PrizeKind::LuckyDip => LUCKY_DIP_MATCHES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Winner {
    pub user_id: String,
    pub entry_id: i64,
    pub numbers: Numbers,
    pub kind: PrizeKind,
    pub prize_pence: i64,
}

// Settlement

#[derive(Debug, Clone)]
pub struct DrawRequest {
    pub draw_date: String,
    pub jackpot_pence: i64,
    pub is_test: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResultWrite {
    Persisted { result_id: i64 },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct WinnerOutcome {
    #[serde(flatten)]
    pub winner: Winner,
    pub write: ResultWrite,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RenewalReport {
    pub renewed: usize,
    pub deactivated: usize,
    pub skipped: usize,
    pub reminders_sent: usize,
    pub reminder_failures: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementSummary {
    pub draw_id: i64,
    pub draw_date: String,
    pub winning_numbers: Numbers,
    pub jackpot_pence: i64,
    pub lucky_dip_prize_pence: i64,
    pub is_test: bool,
    pub jackpot_winners: usize,
    pub lucky_dip_winners: usize,
    pub jackpot_remainder_pence: i64,
    pub winners: Vec<WinnerOutcome>,
    pub result_failures: usize,
    pub notification_sent: bool,
    pub next_draw_date: Option<String>,
    pub next_draw_date_saved: bool,
    pub renewal: Option<RenewalReport>,
}

impl SettlementSummary {
    /// True when every winner row was written and winners were notified.
    pub fn fully_settled(&self) -> bool {
        self.result_failures == 0 && self.notification_sent
    }
}

// Randomness service (random.org JSON-RPC)

#[derive(Serialize)]
pub struct RpcRequest<P> {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    pub params: P,
    pub id: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedIntegersParams {
    pub api_key: String,
    pub n: usize,
    pub min: u8,
    pub max: u8,
    pub replacement: bool,
    pub user_data: Value,
}

#[derive(Serialize)]
pub struct VerifySignatureParams {
    pub random: Value,
    pub signature: String,
}

#[derive(Deserialize, Debug)]
pub struct RpcResponse<T> {
    pub result: Option<T>,
    pub error: Option<RpcError>,
}

#[derive(Deserialize, Debug)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Deserialize, Debug)]
pub struct SignedIntegersResult {
    pub random: Value,
    pub signature: String,
}

#[derive(Deserialize, Debug)]
pub struct VerifySignatureResult {
    pub authenticity: bool,
}

/// Winning numbers plus the proof needed to verify them later.
#[derive(Debug, Clone)]
pub struct SignedNumbers {
    pub numbers: Vec<i64>,
    pub random: Value,
    pub signature: String,
}

// Payment processor (Stripe)

#[derive(Deserialize, Debug, Clone)]
pub struct ExternalSubscription {
    pub id: String,
    pub status: String,
    pub current_period_end: i64,
}

impl ExternalSubscription {
    /// Active and still inside the paid billing period at `now` (unix seconds).
    pub fn is_current(&self, now: i64) -> bool {
        self.status == "active" && self.current_period_end > now
    }
}

// Notification dispatcher

#[derive(Serialize, Debug)]
pub struct WinnersNotification<'a> {
    pub draw_id: i64,
    pub draw_date: &'a str,
    pub winners: &'a [Winner],
}

#[derive(Serialize, Debug)]
pub struct RenewalReminder<'a> {
    pub user_id: &'a str,
    pub next_draw_date: &'a str,
    pub lines: usize,
}
