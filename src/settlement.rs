use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rusqlite::Connection;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::api::{Notifier, PaymentProcessor, RandomnessSource};
use crate::database::{
    get_active_entries_for_date, insert_draw, insert_result, is_unique_violation,
    live_draw_exists_for_date, set_setting,
};
use crate::error::SettlementError;
use crate::renewal::renew_subscriptions;
use crate::types::{
    DrawRequest, MAX_NUMBER, MIN_NUMBER, NEXT_DRAW_DATE_KEY, NUMBERS_PER_LINE, NewDraw, Numbers,
    ResultWrite, SettlementSummary, WinnerOutcome,
};
use crate::utils::{format_draw_date, last_day_of_next_month, parse_draw_date, validate_numbers};
use crate::winners::determine_winners;

/// Runs the monthly draw: numbers, winners, results, notification, renewal.
pub struct DrawSettlement<R, P, N> {
    connection: Arc<Connection>,
    randomness: R,
    payments: P,
    notifier: N,
    lottery_name: String,
    lucky_dip_prize_pence: i64,
}

impl<R, P, N> DrawSettlement<R, P, N>
where
    R: RandomnessSource,
    P: PaymentProcessor,
    N: Notifier,
{
    pub fn new(
        connection: Arc<Connection>,
        randomness: R,
        payments: P,
        notifier: N,
        lottery_name: &str,
        lucky_dip_prize_pence: i64,
    ) -> Self {
        Self {
            connection,
            randomness,
            payments,
            notifier,
            lottery_name: lottery_name.to_string(),
            lucky_dip_prize_pence,
        }
    }

    pub async fn settle(&self, request: DrawRequest) -> Result<SettlementSummary, SettlementError> {
        let mut rng = StdRng::from_entropy();
        let now = chrono::Utc::now().timestamp();
        self.settle_with(request, &mut rng, now).await
    }

    /// As [`settle`](Self::settle) with the lucky-dip RNG and clock supplied by the caller.
    pub async fn settle_with<G: Rng + ?Sized>(
        &self,
        request: DrawRequest,
        rng: &mut G,
        now: i64,
    ) -> Result<SettlementSummary, SettlementError> {
        let conn = self.connection.as_ref();

        let date = parse_draw_date(&request.draw_date).ok_or_else(|| {
            SettlementError::InvalidInput(format!(
                "draw date '{}' is not YYYY-MM-DD",
                request.draw_date
            ))
        })?;
        let draw_date = format_draw_date(date);
        if request.jackpot_pence < 0 {
            return Err(SettlementError::InvalidInput(
                "jackpot amount cannot be negative".to_string(),
            ));
        }
        let is_test = request.is_test;

        if !is_test && live_draw_exists_for_date(conn, &draw_date)? {
            warn!("Refusing second draw for {}", draw_date);
            return Err(SettlementError::Conflict(draw_date));
        }

        // loaded before anything is written, so a failure here leaves nothing behind
        let entries = get_active_entries_for_date(conn, &draw_date)?;

        info!(
            "🎲 Drawing {} for {} (jackpot {}p, test: {})",
            self.lottery_name, draw_date, request.jackpot_pence, is_test
        );

        let user_data = json!({
            "lottery": self.lottery_name,
            "drawDate": draw_date,
            "test": is_test,
        });
        let signed = self
            .randomness
            .signed_integers(NUMBERS_PER_LINE, MIN_NUMBER, MAX_NUMBER, user_data)
            .await
            .map_err(|e| SettlementError::Randomness(e.to_string()))?;
        let winning: Numbers = validate_numbers(&signed.numbers).map_err(|e| {
            SettlementError::Randomness(format!("unusable numbers {:?}: {}", signed.numbers, e))
        })?;
        let random_data = serde_json::to_string(&signed.random)
            .map_err(|e| SettlementError::Randomness(e.to_string()))?;

        let draw = NewDraw {
            draw_date: draw_date.clone(),
            numbers: winning,
            jackpot_pence: request.jackpot_pence,
            lucky_dip_prize_pence: self.lucky_dip_prize_pence,
            random_data,
            signature: signed.signature,
            is_test,
        };
        let draw_id = insert_draw(conn, &draw).map_err(|e| {
            if !is_test && is_unique_violation(&e) {
                SettlementError::Conflict(draw_date.clone())
            } else {
                SettlementError::DrawInsert(e)
            }
        })?;
        info!("Draw {} recorded with numbers {:?}", draw_id, winning);

        let mut next_draw_date = None;
        let mut next_draw_date_saved = false;
        if !is_test {
            match last_day_of_next_month(date).map(format_draw_date) {
                Some(next) => {
                    match set_setting(conn, NEXT_DRAW_DATE_KEY, &next) {
                        Ok(version) => {
                            info!("Next draw date set to {} (version {})", next, version);
                            next_draw_date_saved = true;
                        }
                        Err(e) => error!("Failed to update next draw date: {}", e),
                    }
                    next_draw_date = Some(next);
                }
                None => error!("No next draw date after {}", draw_date),
            }
        }

        let determination = determine_winners(
            &entries,
            &winning,
            request.jackpot_pence,
            self.lucky_dip_prize_pence,
            rng,
        );
        info!(
            "{} active entries, {} jackpot winner(s), {} lucky dip winner(s)",
            entries.len(),
            determination.jackpot_winners,
            determination.lucky_dip_winners
        );

        let mut outcomes = Vec::with_capacity(determination.winners.len());
        let mut result_failures = 0;
        for winner in &determination.winners {
            let write = match insert_result(conn, draw_id, winner) {
                Ok(result_id) => ResultWrite::Persisted { result_id },
                Err(e) => {
                    error!(
                        "Failed to record result for entry {} ({}): {}",
                        winner.entry_id, winner.user_id, e
                    );
                    result_failures += 1;
                    ResultWrite::Failed {
                        error: e.to_string(),
                    }
                }
            };
            outcomes.push(WinnerOutcome {
                winner: winner.clone(),
                write,
            });
        }

        let notification_sent = match self
            .notifier
            .notify_winners(draw_id, &draw_date, &determination.winners)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to notify winners of draw {}: {}", draw_id, e);
                false
            }
        };

        // next_draw_date is only set for live draws
        let renewal = match next_draw_date.as_deref() {
            Some(next) => Some(
                renew_subscriptions(conn, &self.payments, &self.notifier, &entries, next, now)
                    .await,
            ),
            None => None,
        };

        Ok(SettlementSummary {
            draw_id,
            draw_date,
            winning_numbers: winning,
            jackpot_pence: request.jackpot_pence,
            lucky_dip_prize_pence: self.lucky_dip_prize_pence,
            is_test,
            jackpot_winners: determination.jackpot_winners,
            lucky_dip_winners: determination.lucky_dip_winners,
            jackpot_remainder_pence: determination.jackpot_remainder_pence,
            winners: outcomes,
            result_failures,
            notification_sent,
            next_draw_date,
            next_draw_date_saved,
            renewal,
        })
    }

    /// Asks the randomness service whether a stored draw's proof is authentic.
    pub async fn verify_draw(&self, draw_id: i64) -> anyhow::Result<Option<bool>> {
        let Some(draw) = crate::database::get_draw_by_id(&self.connection, draw_id)? else {
            return Ok(None);
        };
        let random: serde_json::Value = serde_json::from_str(&draw.random_data)?;
        let authentic = self
            .randomness
            .verify_signature(random, &draw.signature)
            .await
            .map_err(|e| anyhow::anyhow!("Verification error: {}", e))?;
        Ok(Some(authentic))
    }
}
