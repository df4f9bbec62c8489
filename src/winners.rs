use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::HashSet;

use crate::types::{EntryRow, LUCKY_DIP_WINNERS, Numbers, PrizeKind, Winner};

#[derive(Debug, Clone, Default)]
pub struct Determination {
    pub winners: Vec<Winner>,
    pub jackpot_winners: usize,
    pub lucky_dip_winners: usize,
    /// Pence left over when the jackpot does not divide evenly.
    pub jackpot_remainder_pence: i64,
}

fn sorted(numbers: &Numbers) -> Numbers {
    let mut line = *numbers;
    line.sort_unstable();
    line
}

/// Set equality of a line against the winning numbers; order does not matter.
pub fn is_jackpot(line: &Numbers, winning: &Numbers) -> bool {
    sorted(line) == sorted(winning)
}

/// Equal share per winner and the indivisible remainder.
pub fn split_jackpot(jackpot_pence: i64, winners: usize) -> (i64, i64) {
    if winners == 0 {
        return (0, 0);
    }
    let winners = winners as i64;
    (jackpot_pence / winners, jackpot_pence % winners)
}

/// Shuffles the candidates and keeps the first entry seen for each user, up to `count`.
pub fn select_lucky_dip<'a, R: Rng + ?Sized>(
    candidates: &[&'a EntryRow],
    count: usize,
    rng: &mut R,
) -> Vec<&'a EntryRow> {
    let mut shuffled = candidates.to_vec();
    shuffled.shuffle(rng);

    let mut seen_users = HashSet::new();
    let mut picked = Vec::with_capacity(count);
    for entry in shuffled {
        if picked.len() == count {
            break;
        }
        if seen_users.insert(entry.user_id.as_str()) {
            picked.push(entry);
        }
    }
    picked
}

pub fn determine_winners<R: Rng + ?Sized>(
    entries: &[EntryRow],
    winning: &Numbers,
    jackpot_pence: i64,
    lucky_dip_prize_pence: i64,
    rng: &mut R,
) -> Determination {
    let (jackpot_entries, others): (Vec<&EntryRow>, Vec<&EntryRow>) = entries
        .iter()
        .filter(|e| e.is_active)
        .partition(|e| is_jackpot(&e.numbers, winning));

    let (share, remainder) = split_jackpot(jackpot_pence, jackpot_entries.len());

    let mut winners: Vec<Winner> = jackpot_entries
        .iter()
        .map(|e| Winner {
            user_id: e.user_id.clone(),
            entry_id: e.id,
            numbers: e.numbers,
            kind: PrizeKind::Jackpot,
            prize_pence: share,
        })
        .collect();

    let lucky = select_lucky_dip(&others, LUCKY_DIP_WINNERS, rng);
    winners.extend(lucky.iter().map(|e| Winner {
        user_id: e.user_id.clone(),
        entry_id: e.id,
        numbers: e.numbers,
        kind: PrizeKind::LuckyDip,
        prize_pence: lucky_dip_prize_pence,
    }));

    Determination {
        jackpot_winners: jackpot_entries.len(),
        lucky_dip_winners: lucky.len(),
        jackpot_remainder_pence: remainder,
        winners,
    }
}
