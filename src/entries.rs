use rusqlite::Connection;
use tracing::{info, warn};

use crate::database::{
    deactivate_undrawn_subscription_entries, get_entry_by_payment_ref, get_setting,
    get_subscription_by_external_id, insert_entry, insert_subscription,
    update_subscription_status,
};
use crate::error::EntryError;
use crate::types::{NEXT_DRAW_DATE_KEY, NewEntry, Numbers};
use crate::utils::{format_draw_date, parse_draw_date, validate_numbers};

#[derive(Debug, Clone)]
pub struct EntryRequest {
    pub user_id: String,
    pub numbers: Vec<i64>,
    pub draw_date: String,
    pub line_number: i64,
    pub subscription_id: Option<String>,
    pub payment_ref: Option<String>,
}

/// Outcome of an intake call. `created` is false when a retried webhook
/// matched rows that were already stored.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Intake {
    pub entry_ids: Vec<i64>,
    pub created: bool,
    pub draw_date: String,
}

fn require_user(user_id: &str) -> Result<(), EntryError> {
    if user_id.trim().is_empty() {
        return Err(EntryError::InvalidInput("user id is required".to_string()));
    }
    Ok(())
}

/// Current value of the next-draw-date setting.
pub fn current_draw_date(conn: &Connection) -> Result<String, EntryError> {
    get_setting(conn, NEXT_DRAW_DATE_KEY)?
        .map(|s| s.value)
        .ok_or_else(|| EntryError::InvalidInput("next draw date has not been set".to_string()))
}

pub fn create_entry(conn: &Connection, request: &EntryRequest) -> Result<Intake, EntryError> {
    require_user(&request.user_id)?;
    let numbers = validate_numbers(&request.numbers)?;
    let draw_date = parse_draw_date(&request.draw_date)
        .map(format_draw_date)
        .ok_or_else(|| {
            EntryError::InvalidInput(format!("draw date '{}' is not YYYY-MM-DD", request.draw_date))
        })?;
    if request.line_number < 1 {
        return Err(EntryError::InvalidInput("line number starts at 1".to_string()));
    }

    if let Some(payment_ref) = request.payment_ref.as_deref() {
        if let Some(existing) = get_entry_by_payment_ref(conn, payment_ref)? {
            info!("Payment {} already recorded as entry {}", payment_ref, existing.id);
            return Ok(Intake {
                entry_ids: vec![existing.id],
                created: false,
                draw_date: existing.draw_date,
            });
        }
    }

    let entry = NewEntry {
        user_id: request.user_id.clone(),
        numbers,
        line_number: request.line_number,
        subscription_id: request.subscription_id.clone(),
        payment_ref: request.payment_ref.clone(),
        draw_date: draw_date.clone(),
    };

    match insert_entry(conn, &entry)? {
        Some(id) => Ok(Intake {
            entry_ids: vec![id],
            created: true,
            draw_date,
        }),
        None => Ok(Intake {
            entry_ids: Vec::new(),
            created: false,
            draw_date,
        }),
    }
}

fn validate_lines(lines: &[Vec<i64>]) -> Result<Vec<Numbers>, EntryError> {
    if lines.is_empty() {
        return Err(EntryError::InvalidInput("at least one line is required".to_string()));
    }
    lines.iter().map(|l| validate_numbers(l)).collect()
}

/// One-off purchase: one entry per line for the current draw.
/// Each line's payment reference is `<payment_ref>-<line>`.
pub fn purchase_one_off(
    conn: &Connection,
    user_id: &str,
    lines: &[Vec<i64>],
    payment_ref: &str,
) -> Result<Intake, EntryError> {
    require_user(user_id)?;
    if payment_ref.trim().is_empty() {
        return Err(EntryError::InvalidInput("payment reference is required".to_string()));
    }
    let lines = validate_lines(lines)?;
    let draw_date = current_draw_date(conn)?;

    let mut entry_ids = Vec::with_capacity(lines.len());
    let mut created = false;
    for (i, numbers) in lines.iter().enumerate() {
        let line_number = i as i64 + 1;
        let line_ref = format!("{}-{}", payment_ref, line_number);

        if let Some(existing) = get_entry_by_payment_ref(conn, &line_ref)? {
            entry_ids.push(existing.id);
            continue;
        }

        let entry = NewEntry {
            user_id: user_id.to_string(),
            numbers: *numbers,
            line_number,
            subscription_id: None,
            payment_ref: Some(line_ref),
            draw_date: draw_date.clone(),
        };
        if let Some(id) = insert_entry(conn, &entry)? {
            entry_ids.push(id);
            created = true;
        }
    }

    info!(
        "Purchase {} for {}: {} line(s) in draw {}",
        payment_ref,
        user_id,
        entry_ids.len(),
        draw_date
    );
    Ok(Intake {
        entry_ids,
        created,
        draw_date,
    })
}

/// First recurring payment: records the subscription and enters its lines
/// in the current draw. Repeat deliveries of the same event are no-ops.
pub fn start_subscription(
    conn: &Connection,
    user_id: &str,
    external_id: &str,
    customer_id: &str,
    lines: &[Vec<i64>],
) -> Result<Intake, EntryError> {
    require_user(user_id)?;
    if external_id.trim().is_empty() {
        return Err(EntryError::InvalidInput("subscription id is required".to_string()));
    }
    let lines = validate_lines(lines)?;
    let draw_date = current_draw_date(conn)?;

    let (subscription_row, created) =
        insert_subscription(conn, user_id, external_id, customer_id, &lines)?;
    if !created {
        info!("Subscription {} already recorded", external_id);
    }

    let mut entry_ids = Vec::with_capacity(lines.len());
    for (i, numbers) in lines.iter().enumerate() {
        let entry = NewEntry {
            user_id: user_id.to_string(),
            numbers: *numbers,
            line_number: i as i64 + 1,
            subscription_id: Some(external_id.to_string()),
            payment_ref: None,
            draw_date: draw_date.clone(),
        };
        if let Some(id) = insert_entry(conn, &entry)? {
            entry_ids.push(id);
        }
    }

    info!(
        "Subscription {} (row {}) for {}: {} new line(s) in draw {}",
        external_id,
        subscription_row,
        user_id,
        entry_ids.len(),
        draw_date
    );
    Ok(Intake {
        created: !entry_ids.is_empty(),
        entry_ids,
        draw_date,
    })
}

/// Cancels a subscription (by the user or the processor) and withdraws its
/// lines from draws that have not happened yet. Returns the number of entries deactivated.
pub fn cancel_subscription(
    conn: &Connection,
    external_id: &str,
    reason: &str,
) -> Result<usize, EntryError> {
    let subscription = get_subscription_by_external_id(conn, external_id)?
        .ok_or_else(|| EntryError::UnknownSubscription(external_id.to_string()))?;

    if subscription.status == "canceled" {
        info!("Subscription {} already canceled", external_id);
        return Ok(0);
    }

    update_subscription_status(conn, external_id, "canceled")?;
    let deactivated = deactivate_undrawn_subscription_entries(conn, external_id)?;
    if deactivated == 0 {
        warn!("Subscription {} canceled with no pending entries", external_id);
    }
    info!(
        "Subscription {} canceled ({}), {} entries withdrawn",
        external_id, reason, deactivated
    );
    Ok(deactivated)
}
