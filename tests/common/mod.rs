#![allow(dead_code)]

use club_lotto::api::{Notifier, PaymentProcessor, RandomnessSource};
use club_lotto::database::{create_database_with_connection, insert_draw, insert_entry};
use club_lotto::error::ApiError;
use club_lotto::settlement::DrawSettlement;
use club_lotto::types::{
    ExternalSubscription, NewDraw, NewEntry, Numbers, SignedNumbers, Winner,
};
use rusqlite::Connection;
use serde_json::{Value, json};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

pub const NOW: i64 = 1_750_000_000;
pub const DAY: i64 = 86_400;
pub const LUCKY_DIP_PRIZE: i64 = 1_000;

#[derive(Debug, Default)]
pub struct Calls {
    pub random_requests: Vec<Value>,
    pub verifications: usize,
    pub notified: Vec<(i64, Vec<Winner>)>,
    pub reminders: Vec<(String, String, usize)>,
    pub subscription_checks: Vec<String>,
}

pub type Recorder = Rc<RefCell<Calls>>;

pub struct FakeRandomness {
    pub numbers: Option<Vec<i64>>,
    /// Another run records a live draw for the same date while this one waits on random.org.
    pub competing_draw: Option<Arc<Connection>>,
    pub calls: Recorder,
}

impl RandomnessSource for FakeRandomness {
    async fn signed_integers(
        &self,
        n: usize,
        min: u8,
        max: u8,
        user_data: Value,
    ) -> Result<SignedNumbers, ApiError> {
        self.calls.borrow_mut().random_requests.push(user_data.clone());
        assert_eq!((n, min, max), (4, 1, 32));

        if let Some(conn) = &self.competing_draw {
            let draw_date = user_data["drawDate"].as_str().unwrap().to_string();
            insert_draw(
                conn,
                &NewDraw {
                    draw_date,
                    numbers: [1, 2, 3, 4],
                    jackpot_pence: 0,
                    lucky_dip_prize_pence: 0,
                    random_data: "{}".to_string(),
                    signature: "other".to_string(),
                    is_test: false,
                },
            )
            .unwrap();
        }

        let numbers = self.numbers.clone().ok_or_else(|| ApiError::Remote {
            service: "random.org",
            code: 503,
            message: "service unavailable".to_string(),
        })?;
        Ok(SignedNumbers {
            random: json!({ "data": numbers, "userData": user_data }),
            numbers,
            signature: "c2lnbmVk".to_string(),
        })
    }

    async fn verify_signature(&self, random: Value, signature: &str) -> Result<bool, ApiError> {
        self.calls.borrow_mut().verifications += 1;
        Ok(random.get("data").is_some() && signature == "c2lnbmVk")
    }
}

#[derive(Default)]
pub struct FakePayments {
    pub subscriptions: HashMap<String, ExternalSubscription>,
    pub calls: Recorder,
}

impl FakePayments {
    pub fn with(mut self, id: &str, status: &str, current_period_end: i64) -> Self {
        self.subscriptions.insert(
            id.to_string(),
            ExternalSubscription {
                id: id.to_string(),
                status: status.to_string(),
                current_period_end,
            },
        );
        self
    }
}

impl PaymentProcessor for FakePayments {
    async fn retrieve_subscription(&self, id: &str) -> Result<ExternalSubscription, ApiError> {
        self.calls.borrow_mut().subscription_checks.push(id.to_string());
        self.subscriptions
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::Remote {
                service: "stripe",
                code: 500,
                message: "connection reset".to_string(),
            })
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    pub fail_winners: bool,
    pub fail_reminders: bool,
    pub calls: Recorder,
}

impl Notifier for FakeNotifier {
    async fn notify_winners(
        &self,
        draw_id: i64,
        _draw_date: &str,
        winners: &[Winner],
    ) -> Result<(), ApiError> {
        if self.fail_winners {
            return Err(ApiError::Malformed("notify", "timeout".to_string()));
        }
        self.calls
            .borrow_mut()
            .notified
            .push((draw_id, winners.to_vec()));
        Ok(())
    }

    async fn send_renewal_reminder(
        &self,
        user_id: &str,
        next_draw_date: &str,
        lines: usize,
    ) -> Result<(), ApiError> {
        if self.fail_reminders {
            return Err(ApiError::Malformed("reminder", "timeout".to_string()));
        }
        self.calls.borrow_mut().reminders.push((
            user_id.to_string(),
            next_draw_date.to_string(),
            lines,
        ));
        Ok(())
    }
}

pub type TestSettlement = DrawSettlement<FakeRandomness, FakePayments, FakeNotifier>;

pub fn memory_db() -> Arc<Connection> {
    let conn = Connection::open_in_memory().unwrap();
    create_database_with_connection(&conn).unwrap();
    Arc::new(conn)
}

pub fn settlement(
    conn: &Arc<Connection>,
    numbers: Option<Vec<i64>>,
    payments: FakePayments,
    notifier: FakeNotifier,
) -> (TestSettlement, Recorder) {
    build_settlement(conn, numbers, None, payments, notifier)
}

/// A settlement whose random.org call is overtaken by another run for the same date.
pub fn racing_settlement(
    conn: &Arc<Connection>,
    numbers: Option<Vec<i64>>,
) -> (TestSettlement, Recorder) {
    build_settlement(
        conn,
        numbers,
        Some(Arc::clone(conn)),
        FakePayments::default(),
        FakeNotifier::default(),
    )
}

fn build_settlement(
    conn: &Arc<Connection>,
    numbers: Option<Vec<i64>>,
    competing_draw: Option<Arc<Connection>>,
    mut payments: FakePayments,
    mut notifier: FakeNotifier,
) -> (TestSettlement, Recorder) {
    let calls = Recorder::default();
    payments.calls = Rc::clone(&calls);
    notifier.calls = Rc::clone(&calls);
    let randomness = FakeRandomness {
        numbers,
        competing_draw,
        calls: Rc::clone(&calls),
    };

    let settlement = DrawSettlement::new(
        Arc::clone(conn),
        randomness,
        payments,
        notifier,
        "club-lotto",
        LUCKY_DIP_PRIZE,
    );
    (settlement, calls)
}

pub fn add_entry(conn: &Connection, user: &str, numbers: Numbers, date: &str) -> i64 {
    insert_entry(
        conn,
        &NewEntry {
            user_id: user.to_string(),
            numbers,
            line_number: 1,
            subscription_id: None,
            payment_ref: None,
            draw_date: date.to_string(),
        },
    )
    .unwrap()
    .unwrap()
}

pub fn add_subscription_entry(
    conn: &Connection,
    user: &str,
    subscription_id: &str,
    line_number: i64,
    numbers: Numbers,
    date: &str,
) -> i64 {
    insert_entry(
        conn,
        &NewEntry {
            user_id: user.to_string(),
            numbers,
            line_number,
            subscription_id: Some(subscription_id.to_string()),
            payment_ref: None,
            draw_date: date.to_string(),
        },
    )
    .unwrap()
    .unwrap()
}
