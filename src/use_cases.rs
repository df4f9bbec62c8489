use anyhow::Result;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

use crate::api::{Notifier, PaymentProcessor, RandomnessSource};
use crate::database::*;
use crate::entries::{self, EntryRequest};
use crate::settlement::DrawSettlement;
use crate::types::{DrawRequest, NEXT_DRAW_DATE_KEY};
use crate::utils::{format_draw_date, parse_draw_date};

fn str_arg<'a>(arguments: &'a HashMap<String, Value>, name: &str) -> Result<&'a str> {
    arguments
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("Missing {} parameter", name))
}

fn int_arg(arguments: &HashMap<String, Value>, name: &str) -> Result<i64> {
    arguments
        .get(name)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| anyhow::anyhow!("Missing {} parameter", name))
}

fn lines_arg(arguments: &HashMap<String, Value>) -> Result<Vec<Vec<i64>>> {
    let lines = arguments
        .get("lines")
        .ok_or_else(|| anyhow::anyhow!("Missing lines parameter"))?;
    Ok(serde_json::from_value(lines.clone())?)
}

pub struct DrawUseCase<R, P, N> {
    settlement: DrawSettlement<R, P, N>,
}

impl<R, P, N> DrawUseCase<R, P, N>
where
    R: RandomnessSource,
    P: PaymentProcessor,
    N: Notifier,
{
    pub fn new(settlement: DrawSettlement<R, P, N>) -> Self {
        Self { settlement }
    }

    pub async fn settle_draw(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let request = DrawRequest {
            draw_date: str_arg(arguments, "draw_date")?.to_string(),
            jackpot_pence: int_arg(arguments, "jackpot_pence")?,
            is_test: arguments
                .get("is_test")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
        };

        let summary = self.settlement.settle(request).await?;

        Ok(json!({
            "success": true,
            "fully_settled": summary.fully_settled(),
            "summary": summary
        })
        .to_string())
    }

    pub async fn verify_draw(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let draw_id = int_arg(arguments, "draw_id")?;
        let authentic = self
            .settlement
            .verify_draw(draw_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("No draw with id {}", draw_id))?;

        Ok(json!({
            "success": true,
            "draw_id": draw_id,
            "authentic": authentic
        })
        .to_string())
    }
}

pub struct ResultsUseCase {
    connection: Arc<rusqlite::Connection>,
}

impl ResultsUseCase {
    pub fn new(connection: Arc<rusqlite::Connection>) -> Self {
        Self { connection }
    }

    pub async fn get_draw_by_date(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let date = str_arg(arguments, "date")?;
        let draw = get_draw_by_date(&self.connection, date)?;

        Ok(json!({
            "success": true,
            "draw": draw
        })
        .to_string())
    }

    pub async fn get_results_for_draw(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let draw_id = int_arg(arguments, "draw_id")?;
        let results = get_results_for_draw(&self.connection, draw_id)?;

        Ok(json!({
            "success": true,
            "results": results
        })
        .to_string())
    }

    pub async fn get_latest_draws(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let limit = arguments
            .get("limit")
            .and_then(|v| v.as_i64())
            .unwrap_or(10);

        let draws = get_latest_draws(&self.connection, limit)?;

        Ok(json!({
            "success": true,
            "draws": draws
        })
        .to_string())
    }

    pub async fn get_next_draw_date(&self, _arguments: &HashMap<String, Value>) -> Result<String> {
        let setting = get_setting(&self.connection, NEXT_DRAW_DATE_KEY)?;

        Ok(json!({
            "success": true,
            "next_draw_date": setting.as_ref().map(|s| s.value.clone()),
            "version": setting.as_ref().map(|s| s.version)
        })
        .to_string())
    }

    /// Seeds the setting for a fresh database. After that only settlement moves it.
    pub async fn init_next_draw_date(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let date = str_arg(arguments, "date")?;
        let date = parse_draw_date(date)
            .map(format_draw_date)
            .ok_or_else(|| anyhow::anyhow!("Date must be YYYY-MM-DD"))?;

        if let Some(existing) = get_setting(&self.connection, NEXT_DRAW_DATE_KEY)? {
            anyhow::bail!(
                "Next draw date already set to {} (version {})",
                existing.value,
                existing.version
            );
        }
        let version = set_setting(&self.connection, NEXT_DRAW_DATE_KEY, &date)?;

        Ok(json!({
            "success": true,
            "next_draw_date": date,
            "version": version
        })
        .to_string())
    }
}

pub struct EntryUseCase {
    connection: Arc<rusqlite::Connection>,
}

impl EntryUseCase {
    pub fn new(connection: Arc<rusqlite::Connection>) -> Self {
        Self { connection }
    }

    pub async fn create_entry(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let numbers = arguments
            .get("numbers")
            .ok_or_else(|| anyhow::anyhow!("Missing numbers parameter"))?;

        let request = EntryRequest {
            user_id: str_arg(arguments, "user_id")?.to_string(),
            numbers: serde_json::from_value(numbers.clone())?,
            draw_date: str_arg(arguments, "draw_date")?.to_string(),
            line_number: arguments
                .get("line_number")
                .and_then(|v| v.as_i64())
                .unwrap_or(1),
            subscription_id: str_arg(arguments, "subscription_id").ok().map(str::to_string),
            payment_ref: str_arg(arguments, "payment_ref").ok().map(str::to_string),
        };

        let intake = entries::create_entry(&self.connection, &request)?;

        Ok(json!({
            "success": true,
            "intake": intake
        })
        .to_string())
    }

    pub async fn purchase_one_off(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let user_id = str_arg(arguments, "user_id")?;
        let payment_ref = str_arg(arguments, "payment_ref")?;
        let lines = lines_arg(arguments)?;

        let intake = entries::purchase_one_off(&self.connection, user_id, &lines, payment_ref)?;

        Ok(json!({
            "success": true,
            "intake": intake
        })
        .to_string())
    }

    pub async fn start_subscription(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let user_id = str_arg(arguments, "user_id")?;
        let subscription_id = str_arg(arguments, "subscription_id")?;
        let customer_id = str_arg(arguments, "customer_id")?;
        let lines = lines_arg(arguments)?;

        let intake = entries::start_subscription(
            &self.connection,
            user_id,
            subscription_id,
            customer_id,
            &lines,
        )?;

        Ok(json!({
            "success": true,
            "intake": intake
        })
        .to_string())
    }

    pub async fn cancel_subscription(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let subscription_id = str_arg(arguments, "subscription_id")?;
        let reason = str_arg(arguments, "reason").unwrap_or("user");

        let deactivated = entries::cancel_subscription(&self.connection, subscription_id, reason)?;

        Ok(json!({
            "success": true,
            "subscription_id": subscription_id,
            "entries_deactivated": deactivated
        })
        .to_string())
    }

    pub async fn get_entries_for_user(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let user_id = str_arg(arguments, "user_id")?;
        let entries = get_entries_for_user(&self.connection, user_id)?;

        Ok(json!({
            "success": true,
            "entries": entries
        })
        .to_string())
    }
}
