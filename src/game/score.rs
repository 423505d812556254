//! Scoring Engine
//!
//! Accumulates per-bot results from each turn's event log. Scores follow
//! the classic ruleset:
//!
//! | Component | Award |
//! |---|---|
//! | Bullet damage | 1 point per damage dealt to an opponent |
//! | Bullet kill bonus | 20% of the killer's bullet damage to the victim |
//! | Ram damage | 2 points per ram damage dealt by the rammer |
//! | Ram kill bonus | 30% of the killer's ram damage to the victim |
//! | Survival | 50 points each time an opponent dies |
//! | Last survivor | 10 points per opponent in the battle |
//!
//! Damage to teammates is never scored.

use std::collections::{BTreeMap, BTreeSet};
use serde::{Deserialize, Serialize};

use crate::game::events::{Event, EventKind};
use crate::game::rules::RAM_DAMAGE;
use crate::game::state::BotId;

/// Points per opponent death for each surviving bot.
pub const SURVIVAL_SCORE: f64 = 50.0;

/// Points per opponent for the last survivor(s) of a round.
pub const LAST_SURVIVOR_BONUS_PER_OPPONENT: f64 = 10.0;

/// Bullet kill bonus as a share of bullet damage to the victim.
pub const BULLET_KILL_BONUS_FACTOR: f64 = 0.2;

/// Ram kill bonus as a share of ram damage to the victim.
pub const RAM_KILL_BONUS_FACTOR: f64 = 0.3;

/// Ram score per unit of ram damage.
pub const RAM_SCORE_FACTOR: f64 = 2.0;

/// Score components for one bot.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BotScore {
    pub survival: f64,
    pub last_survivor_bonus: f64,
    pub bullet_damage: f64,
    pub bullet_kill_bonus: f64,
    pub ram_damage: f64,
    pub ram_kill_bonus: f64,
}

impl BotScore {
    /// Sum of every component.
    pub fn total(&self) -> f64 {
        self.survival
            + self.last_survivor_bonus
            + self.bullet_damage
            + self.bullet_kill_bonus
            + self.ram_damage
            + self.ram_kill_bonus
    }

    fn add(&mut self, other: &BotScore) {
        self.survival += other.survival;
        self.last_survivor_bonus += other.last_survivor_bonus;
        self.bullet_damage += other.bullet_damage;
        self.bullet_kill_bonus += other.bullet_kill_bonus;
        self.ram_damage += other.ram_damage;
        self.ram_kill_bonus += other.ram_kill_bonus;
    }
}

/// Ranked result row sent to bots and observers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotResults {
    pub id: BotId,
    pub rank: u32,
    pub survival: f64,
    pub last_survivor_bonus: f64,
    pub bullet_damage: f64,
    pub bullet_kill_bonus: f64,
    pub ram_damage: f64,
    pub ram_kill_bonus: f64,
    pub total_score: f64,
    pub first_places: u32,
    pub second_places: u32,
    pub third_places: u32,
}

/// Running scores for one battle.
#[derive(Clone, Debug, Default)]
pub struct ScoreTracker {
    teams: BTreeMap<BotId, Option<u32>>,
    round: BTreeMap<BotId, BotScore>,
    totals: BTreeMap<BotId, BotScore>,
    placements: BTreeMap<BotId, [u32; 3]>,
    /// Bullet damage this round, by (attacker, victim)
    bullet_dealt: BTreeMap<(BotId, BotId), f64>,
    /// Ram damage this round, by (rammer, victim)
    ram_dealt: BTreeMap<(BotId, BotId), f64>,
    alive: BTreeSet<BotId>,
    /// Round deaths, earliest first
    death_order: Vec<BotId>,
}

impl ScoreTracker {
    /// Tracker for a battle's participants and their teams.
    pub fn new(participants: impl IntoIterator<Item = (BotId, Option<u32>)>) -> Self {
        let teams: BTreeMap<BotId, Option<u32>> = participants.into_iter().collect();
        let totals = teams.keys().map(|id| (*id, BotScore::default())).collect();
        let placements = teams.keys().map(|id| (*id, [0; 3])).collect();
        let mut tracker = Self { teams, totals, placements, ..Default::default() };
        tracker.start_round();
        tracker
    }

    /// Reset round-scoped scores.
    pub fn start_round(&mut self) {
        self.round = self.teams.keys().map(|id| (*id, BotScore::default())).collect();
        self.bullet_dealt.clear();
        self.ram_dealt.clear();
        self.alive = self.teams.keys().copied().collect();
        self.death_order.clear();
    }

    /// Whether `a` and `b` are different bots on the same team.
    fn teammates(&self, a: BotId, b: BotId) -> bool {
        let ta = self.teams.get(&a).copied().flatten();
        a != b && ta.is_some() && ta == self.teams.get(&b).copied().flatten()
    }

    /// Score one turn's events, in log order.
    pub fn record_turn(&mut self, events: &[Event]) {
        for event in events {
            match &event.kind {
                EventKind::BulletHitBot { victim_id, bullet, damage, .. } => {
                    let shooter = bullet.owner_id;
                    if self.teammates(shooter, *victim_id) {
                        continue;
                    }
                    if let Some(score) = self.round.get_mut(&shooter) {
                        score.bullet_damage += damage;
                    }
                    *self.bullet_dealt.entry((shooter, *victim_id)).or_default() += damage;
                }
                EventKind::BotHitBot { victim_id, bot_id, rammed: true, .. } => {
                    if self.teammates(*bot_id, *victim_id) {
                        continue;
                    }
                    if let Some(score) = self.round.get_mut(bot_id) {
                        score.ram_damage += RAM_SCORE_FACTOR * RAM_DAMAGE;
                    }
                    *self.ram_dealt.entry((*bot_id, *victim_id)).or_default() += RAM_DAMAGE;
                }
                EventKind::BotDeath { victim_id } => {
                    self.record_death(*victim_id, events);
                }
                _ => {}
            }
        }
    }

    fn record_death(&mut self, victim: BotId, turn_events: &[Event]) {
        if !self.alive.remove(&victim) {
            return;
        }
        self.death_order.push(victim);

        for survivor in self.alive.clone() {
            if self.teammates(survivor, victim) {
                continue;
            }
            if let Some(score) = self.round.get_mut(&survivor) {
                score.survival += SURVIVAL_SCORE;
            }
        }

        // The killing blow is the last hit this turn that left the victim empty
        let killer = turn_events.iter().rev().find_map(|e| match &e.kind {
            EventKind::BulletHitBot { victim_id, bullet, energy, .. }
                if *victim_id == victim && *energy <= 0.0 =>
            {
                Some((bullet.owner_id, false))
            }
            EventKind::BotHitBot { victim_id, bot_id, energy, rammed: true, .. }
                if *victim_id == victim && *energy <= 0.0 =>
            {
                Some((*bot_id, true))
            }
            _ => None,
        });

        let Some((killer, by_ram)) = killer else {
            return;
        };
        if self.teammates(killer, victim) {
            return;
        }
        let (dealt, factor) = if by_ram {
            (self.ram_dealt.get(&(killer, victim)).copied().unwrap_or(0.0), RAM_KILL_BONUS_FACTOR)
        } else {
            (self.bullet_dealt.get(&(killer, victim)).copied().unwrap_or(0.0), BULLET_KILL_BONUS_FACTOR)
        };
        if let Some(score) = self.round.get_mut(&killer) {
            if by_ram {
                score.ram_kill_bonus += dealt * factor;
            } else {
                score.bullet_kill_bonus += dealt * factor;
            }
        }
    }

    /// Close the round: award last-survivor bonuses, count placements, add
    /// the round into the battle totals, and return the ranked round rows.
    pub fn finish_round(&mut self) -> Vec<BotResults> {
        let survivors: Vec<BotId> = self.alive.iter().copied().collect();
        let single_side = survivors
            .iter()
            .all(|s| survivors.iter().all(|o| o == s || self.teammates(*s, *o)));

        if !survivors.is_empty() && single_side {
            for survivor in &survivors {
                let opponents = self
                    .teams
                    .keys()
                    .filter(|id| *id != survivor && !self.teammates(*survivor, **id))
                    .count() as f64;
                if let Some(score) = self.round.get_mut(survivor) {
                    score.last_survivor_bonus += LAST_SURVIVOR_BONUS_PER_OPPONENT * opponents;
                }
            }
        }

        // Finishing order: survivors by round score, then the dead, last to die first
        let mut order = survivors;
        order.sort_by(|a, b| self.round_total(*b).total_cmp(&self.round_total(*a)).then(a.cmp(b)));
        order.extend(self.death_order.iter().rev().copied());

        for (place, id) in order.iter().take(3).enumerate() {
            if let Some(counts) = self.placements.get_mut(id) {
                counts[place] += 1;
            }
        }

        for (id, score) in &self.round {
            if let Some(total) = self.totals.get_mut(id) {
                total.add(score);
            }
        }

        let rows = self.round.iter().map(|(id, score)| (*id, *score)).collect();
        rank_rows(rows, &BTreeMap::new())
    }

    fn round_total(&self, id: BotId) -> f64 {
        self.round.get(&id).map(BotScore::total).unwrap_or(0.0)
    }

    /// Ranked battle totals.
    pub fn game_results(&self) -> Vec<BotResults> {
        let rows = self.totals.iter().map(|(id, score)| (*id, *score)).collect();
        rank_rows(rows, &self.placements)
    }

    /// Current round score for a bot.
    pub fn round_score(&self, id: BotId) -> Option<&BotScore> {
        self.round.get(&id)
    }
}

/// Sort rows by total score (then first places, then id) and assign ranks.
/// Equal totals share a rank.
fn rank_rows(rows: Vec<(BotId, BotScore)>, placements: &BTreeMap<BotId, [u32; 3]>) -> Vec<BotResults> {
    let mut rows: Vec<BotResults> = rows
        .into_iter()
        .map(|(id, score)| {
            let places = placements.get(&id).copied().unwrap_or([0; 3]);
            BotResults {
                id,
                rank: 0,
                survival: score.survival,
                last_survivor_bonus: score.last_survivor_bonus,
                bullet_damage: score.bullet_damage,
                bullet_kill_bonus: score.bullet_kill_bonus,
                ram_damage: score.ram_damage,
                ram_kill_bonus: score.ram_kill_bonus,
                total_score: score.total(),
                first_places: places[0],
                second_places: places[1],
                third_places: places[2],
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.total_score
            .total_cmp(&a.total_score)
            .then(b.first_places.cmp(&a.first_places))
            .then(a.id.cmp(&b.id))
    });

    let mut previous: Option<(f64, u32)> = None;
    for (i, row) in rows.iter_mut().enumerate() {
        row.rank = match previous {
            Some((total, rank)) if total == row.total_score => rank,
            _ => i as u32 + 1,
        };
        previous = Some((row.total_score, row.rank));
    }
    rows
}

// =============================================================================
// TESTS
// =============================================================================
