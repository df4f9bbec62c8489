use rusqlite::Connection;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

use crate::api::{Notifier, PaymentProcessor};
use crate::database::{deactivate_entry, insert_entry, update_subscription_status};
use crate::types::{EntryRow, NewEntry, RenewalReport};

#[derive(Debug, Clone)]
enum Verdict {
    Current,
    Lapsed(String),
    Unverified,
}

/// Carries subscription-backed entries forward to `next_draw_date`.
///
/// Each subscription is checked against the payment processor once per batch;
/// the local mirror is never trusted. Lapsed or canceled subscriptions have
/// their entry deactivated. A failed check skips only the entries it covers.
/// Renewed users get one reminder each once the batch is done.
pub async fn renew_subscriptions<P, N>(
    conn: &Connection,
    payments: &P,
    notifier: &N,
    entries: &[EntryRow],
    next_draw_date: &str,
    now: i64,
) -> RenewalReport
where
    P: PaymentProcessor,
    N: Notifier,
{
    let mut report = RenewalReport::default();
    let mut verdicts: HashMap<String, Verdict> = HashMap::new();
    let mut renewed_lines: BTreeMap<String, usize> = BTreeMap::new();

    for entry in entries.iter().filter(|e| e.is_active) {
        let Some(subscription_id) = entry.subscription_id.as_deref() else {
            continue;
        };

        if !verdicts.contains_key(subscription_id) {
            let verdict = match payments.retrieve_subscription(subscription_id).await {
                Ok(sub) if sub.is_current(now) => Verdict::Current,
                Ok(sub) => {
                    let status = if sub.status == "active" {
                        "lapsed".to_string()
                    } else {
                        sub.status
                    };
                    Verdict::Lapsed(status)
                }
                Err(e) => {
                    warn!("Could not verify subscription {}: {}", subscription_id, e);
                    Verdict::Unverified
                }
            };
            verdicts.insert(subscription_id.to_string(), verdict);
        }

        match &verdicts[subscription_id] {
            Verdict::Current => {
                let renewed = NewEntry {
                    user_id: entry.user_id.clone(),
                    numbers: entry.numbers,
                    line_number: entry.line_number,
                    subscription_id: Some(subscription_id.to_string()),
                    payment_ref: None,
                    draw_date: next_draw_date.to_string(),
                };
                match insert_entry(conn, &renewed) {
                    Ok(Some(_)) => {
                        report.renewed += 1;
                        *renewed_lines.entry(entry.user_id.clone()).or_insert(0) += 1;
                    }
                    Ok(None) => {
                        info!(
                            "Entry {} already carried forward to {}",
                            entry.id, next_draw_date
                        );
                    }
                    Err(e) => {
                        warn!("Failed to renew entry {}: {}", entry.id, e);
                        report.skipped += 1;
                    }
                }
            }
            Verdict::Lapsed(status) => {
                if let Err(e) = deactivate_entry(conn, entry.id) {
                    warn!("Failed to deactivate entry {}: {}", entry.id, e);
                    report.skipped += 1;
                    continue;
                }
                if let Err(e) = update_subscription_status(conn, subscription_id, status) {
                    warn!(
                        "Failed to mirror status of subscription {}: {}",
                        subscription_id, e
                    );
                }
                info!(
                    "Entry {} not renewed, subscription {} is {}",
                    entry.id, subscription_id, status
                );
                report.deactivated += 1;
            }
            Verdict::Unverified => report.skipped += 1,
        }
    }

    for (user_id, lines) in &renewed_lines {
        match notifier
            .send_renewal_reminder(user_id, next_draw_date, *lines)
            .await
        {
            Ok(()) => report.reminders_sent += 1,
            Err(e) => {
                warn!("Failed to send renewal reminder to {}: {}", user_id, e);
                report.reminder_failures += 1;
            }
        }
    }

    info!(
        "Renewal to {}: {} renewed, {} deactivated, {} skipped",
        next_draw_date, report.renewed, report.deactivated, report.skipped
    );
    report
}
