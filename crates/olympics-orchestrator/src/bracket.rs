//! Bracket and pairing generators.
//!
//! All generators work on the seed list produced by [`build_seeds`] and are
//! pure: they only build schedules and standings, the tournament controller
//! runs the matches.
//!
//! - Single elimination: standard seeding so seeds 1 and 2 can only meet in
//!   the final, top seeds take the byes when the field is not a power of two.
//! - Round robin: circle method, one bye per round for odd fields.
//! - Swiss: seed fold for round 1, then record-based pairings that avoid
//!   rematches whenever the field allows it.

use crate::types::{
    Bracket, BracketNode, TournamentMatch, TournamentRound, TournamentSeed, TournamentStanding,
    DEFAULT_ELO_RATING,
};
use olympics_core::AgentConfig;
use std::collections::{HashMap, HashSet};

/// Upper bound on backtracking steps when searching rematch-free pairings.
const PAIRING_SEARCH_BUDGET: usize = 10_000;

/// Seeds in agent order: the first agent is seed 1.
pub fn build_seeds(agents: &[AgentConfig]) -> Vec<TournamentSeed> {
    agents
        .iter()
        .enumerate()
        .map(|(i, agent)| TournamentSeed {
            agent_id: agent.id.clone(),
            seed_number: i + 1,
            elo_rating: agent.elo_rating.unwrap_or(DEFAULT_ELO_RATING),
        })
        .collect()
}

fn ceil_log2(n: usize) -> usize {
    if n <= 1 {
        0
    } else {
        (usize::BITS - (n - 1).leading_zeros()) as usize
    }
}

pub fn single_elimination_round_count(agents: usize) -> usize {
    ceil_log2(agents)
}

pub fn round_robin_round_count(agents: usize) -> usize {
    match agents {
        0 | 1 => 0,
        n if n % 2 == 0 => n - 1,
        n => n,
    }
}

/// Rounds a Swiss tournament plays, capped by `configured_max`.
pub fn swiss_round_count(agents: usize, configured_max: usize) -> usize {
    if agents < 2 {
        return 0;
    }
    configured_max.min(ceil_log2(agents) + 1)
}

// --- Single elimination ---

/// Rounds and bracket graph of a single-elimination tournament.
#[derive(Debug, Clone)]
pub struct SingleEliminationSchedule {
    pub rounds: Vec<TournamentRound>,
    pub bracket: Bracket,
}

/// Seed numbers in bracket slot order for a power-of-two bracket, so that
/// adjacent slots play each other in round 1.
pub fn seeding_order(size: usize) -> Vec<usize> {
    let mut order = vec![1];
    while order.len() < size {
        let width = order.len() * 2;
        order = order.iter().flat_map(|&s| [s, width + 1 - s]).collect();
    }
    order
}

fn elimination_round_name(round: usize, total: usize) -> String {
    match total - round {
        0 => "Final".to_string(),
        1 => "Semifinals".to_string(),
        2 => "Quarterfinals".to_string(),
        remaining => format!("Round of {}", 1usize << (remaining + 1)),
    }
}

pub fn generate_single_elimination(seeds: &[TournamentSeed]) -> SingleEliminationSchedule {
    let total = single_elimination_round_count(seeds.len());
    if total == 0 {
        return SingleEliminationSchedule {
            rounds: Vec::new(),
            bracket: Bracket::default(),
        };
    }
    let size = 1usize << total;
    let agent_for = |seed: usize| {
        seeds
            .iter()
            .find(|s| s.seed_number == seed)
            .map(|s| s.agent_id.clone())
    };

    let first: Vec<TournamentMatch> = seeding_order(size)
        .chunks(2)
        .enumerate()
        .map(|(i, pair)| {
            let match_number = i + 1;
            match (agent_for(pair[0]), agent_for(pair[1])) {
                (Some(a), Some(b)) => TournamentMatch::new(match_number, vec![a, b]),
                (Some(a), None) | (None, Some(a)) => TournamentMatch::bye(match_number, a),
                (None, None) => TournamentMatch::new(match_number, Vec::new()),
            }
        })
        .collect();

    let mut rounds = vec![TournamentRound::new(1, elimination_round_name(1, total), first)];
    for round_number in 2..=total {
        let matches = (1..=size >> round_number)
            .map(|m| TournamentMatch::new(m, Vec::new()))
            .collect();
        rounds.push(TournamentRound::new(
            round_number,
            elimination_round_name(round_number, total),
            matches,
        ));
    }

    let nodes = rounds
        .iter()
        .flat_map(|round| {
            round.matches.iter().map(move |m| BracketNode {
                id: Bracket::node_id(round.round_number, m.match_number),
                match_id: m.id,
                round_number: round.round_number,
                match_number: m.match_number,
                agent_ids: m.agent_ids.clone(),
                winner_id: m.winner_id.clone(),
                child_node: (round.round_number < total)
                    .then(|| Bracket::node_id(round.round_number + 1, m.match_number.div_ceil(2))),
            })
        })
        .collect();

    SingleEliminationSchedule {
        rounds,
        bracket: Bracket { nodes },
    }
}

// --- Round robin ---

/// Every pair plays once; no agent appears twice in a round.
pub fn generate_round_robin(seeds: &[TournamentSeed]) -> Vec<TournamentRound> {
    let mut slots: Vec<Option<&str>> = seeds.iter().map(|s| Some(s.agent_id.as_str())).collect();
    if slots.len() % 2 == 1 {
        slots.push(None);
    }
    let width = slots.len();
    if width < 2 {
        return Vec::new();
    }

    let mut rounds = Vec::with_capacity(width - 1);
    for round_index in 0..width - 1 {
        let mut matches = Vec::with_capacity(width / 2);
        for i in 0..width / 2 {
            let match_number = matches.len() + 1;
            match (slots[i], slots[width - 1 - i]) {
                (Some(a), Some(b)) => {
                    matches.push(TournamentMatch::new(
                        match_number,
                        vec![a.to_string(), b.to_string()],
                    ));
                }
                (Some(a), None) | (None, Some(a)) => {
                    matches.push(TournamentMatch::bye(match_number, a));
                }
                (None, None) => {}
            }
        }
        rounds.push(TournamentRound::new(
            round_index + 1,
            format!("Round {}", round_index + 1),
            matches,
        ));
        slots[1..].rotate_right(1);
    }
    rounds
}

// --- Swiss ---

/// Round 1 folds the seed list: seed 1 meets the top of the bottom half.
pub fn generate_swiss_first_round(seeds: &[TournamentSeed]) -> TournamentRound {
    let mut ordered: Vec<&TournamentSeed> = seeds.iter().collect();
    ordered.sort_by_key(|s| s.seed_number);
    let mut ids: Vec<&str> = ordered.iter().map(|s| s.agent_id.as_str()).collect();
    let bye = if ids.len() % 2 == 1 { ids.pop() } else { None };

    let half = ids.len() / 2;
    let mut matches: Vec<TournamentMatch> = (0..half)
        .map(|i| TournamentMatch::new(i + 1, vec![ids[i].to_string(), ids[i + half].to_string()]))
        .collect();
    if let Some(agent_id) = bye {
        matches.push(TournamentMatch::bye(matches.len() + 1, agent_id));
    }
    TournamentRound::new(1, "Round 1", matches)
}

/// Pair the next Swiss round from the records of the rounds played so far.
///
/// Agents are ordered by wins, then score, then seed. The bye goes to the
/// lowest-ordered agent without one. Pairings avoid rematches when a
/// rematch-free pairing exists; otherwise adjacent agents are paired greedily.
pub fn generate_swiss_pairings(
    round_number: usize,
    seeds: &[TournamentSeed],
    previous_rounds: &[TournamentRound],
) -> TournamentRound {
    let records = tally(previous_rounds, true);
    let record = |id: &str| records.get(id).cloned().unwrap_or_default();

    let mut ordered: Vec<&TournamentSeed> = seeds.iter().collect();
    ordered.sort_by(|a, b| {
        let (ra, rb) = (record(a.agent_id.as_str()), record(b.agent_id.as_str()));
        rb.wins
            .cmp(&ra.wins)
            .then(rb.score.cmp(&ra.score))
            .then(a.seed_number.cmp(&b.seed_number))
    });
    let mut ids: Vec<&str> = ordered.iter().map(|s| s.agent_id.as_str()).collect();

    let bye = if ids.len() % 2 == 1 {
        let position = ids
            .iter()
            .rposition(|id| record(*id).byes == 0)
            .unwrap_or(ids.len() - 1);
        Some(ids.remove(position))
    } else {
        None
    };

    let played = played_pairs(previous_rounds);
    let pairs =
        pair_avoiding_rematches(&ids, &played).unwrap_or_else(|| greedy_pairs(&ids, &played));

    let mut matches: Vec<TournamentMatch> = pairs
        .into_iter()
        .enumerate()
        .map(|(i, (a, b))| TournamentMatch::new(i + 1, vec![a.to_string(), b.to_string()]))
        .collect();
    if let Some(agent_id) = bye {
        matches.push(TournamentMatch::bye(matches.len() + 1, agent_id));
    }
    TournamentRound::new(round_number, format!("Round {round_number}"), matches)
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

fn played_pairs(rounds: &[TournamentRound]) -> HashSet<(String, String)> {
    rounds
        .iter()
        .flat_map(|r| &r.matches)
        .filter(|m| !m.is_bye)
        .filter_map(|m| match m.agent_ids.as_slice() {
            [a, b] => Some(pair_key(a, b)),
            _ => None,
        })
        .collect()
}

fn pair_avoiding_rematches<'a>(
    ids: &[&'a str],
    played: &HashSet<(String, String)>,
) -> Option<Vec<(&'a str, &'a str)>> {
    let mut remaining = ids.to_vec();
    let mut pairs = Vec::with_capacity(ids.len() / 2);
    let mut budget = PAIRING_SEARCH_BUDGET;
    search_pairs(&mut remaining, played, &mut pairs, &mut budget).then_some(pairs)
}

fn search_pairs<'a>(
    remaining: &mut Vec<&'a str>,
    played: &HashSet<(String, String)>,
    pairs: &mut Vec<(&'a str, &'a str)>,
    budget: &mut usize,
) -> bool {
    if remaining.is_empty() {
        return true;
    }
    if *budget == 0 {
        return false;
    }
    *budget -= 1;

    let first = remaining.remove(0);
    for i in 0..remaining.len() {
        if played.contains(&pair_key(first, remaining[i])) {
            continue;
        }
        let opponent = remaining.remove(i);
        pairs.push((first, opponent));
        if search_pairs(remaining, played, pairs, budget) {
            return true;
        }
        pairs.pop();
        remaining.insert(i, opponent);
    }
    remaining.insert(0, first);
    false
}

fn greedy_pairs<'a>(
    ids: &[&'a str],
    played: &HashSet<(String, String)>,
) -> Vec<(&'a str, &'a str)> {
    let mut remaining = ids.to_vec();
    let mut pairs = Vec::with_capacity(ids.len() / 2);
    while remaining.len() >= 2 {
        let first = remaining.remove(0);
        let position = remaining
            .iter()
            .position(|other| !played.contains(&pair_key(first, other)))
            .unwrap_or(0);
        pairs.push((first, remaining.remove(position)));
    }
    pairs
}

// --- Standings ---

#[derive(Debug, Clone, Default)]
struct Record {
    wins: u32,
    losses: u32,
    ties: u32,
    byes: u32,
    score: u64,
}

fn tally(rounds: &[TournamentRound], byes_as_wins: bool) -> HashMap<String, Record> {
    let mut records: HashMap<String, Record> = HashMap::new();
    for m in rounds.iter().flat_map(|r| &r.matches) {
        if m.is_bye {
            if let Some(agent_id) = m.agent_ids.first() {
                let record = records.entry(agent_id.clone()).or_default();
                record.byes += 1;
                if byes_as_wins {
                    record.wins += 1;
                }
            }
            continue;
        }
        for (agent_id, result) in &m.results {
            records.entry(agent_id.clone()).or_default().score += result.score;
        }
        match (&m.winner_id, &m.loser_id) {
            (Some(winner), Some(loser)) => {
                records.entry(winner.clone()).or_default().wins += 1;
                records.entry(loser.clone()).or_default().losses += 1;
            }
            (None, None) if m.agent_ids.len() == 2 && !m.results.is_empty() => {
                for agent_id in &m.agent_ids {
                    records.entry(agent_id.clone()).or_default().ties += 1;
                }
            }
            _ => {}
        }
    }
    records
}

fn standing(
    agent: &AgentConfig,
    record: &Record,
    round_eliminated: Option<usize>,
) -> TournamentStanding {
    TournamentStanding {
        agent_id: agent.id.clone(),
        agent_name: agent.name.clone(),
        rank: 0,
        matches_won: record.wins,
        matches_lost: record.losses,
        matches_tied: record.ties,
        total_score: record.score,
        round_eliminated,
    }
}

fn rank_by_record(
    agents: &[AgentConfig],
    records: &HashMap<String, Record>,
) -> Vec<TournamentStanding> {
    let empty = Record::default();
    let mut standings: Vec<TournamentStanding> = agents
        .iter()
        .map(|agent| standing(agent, records.get(&agent.id).unwrap_or(&empty), None))
        .collect();
    standings.sort_by(|a, b| {
        b.matches_won
            .cmp(&a.matches_won)
            .then(b.total_score.cmp(&a.total_score))
    });
    for (i, s) in standings.iter_mut().enumerate() {
        s.rank = i + 1;
    }
    standings
}

/// Match wins, then cumulative score. Byes count for nothing.
pub fn calculate_round_robin_standings(
    agents: &[AgentConfig],
    rounds: &[TournamentRound],
) -> Vec<TournamentStanding> {
    rank_by_record(agents, &tally(rounds, false))
}

/// Match wins, with a bye counting as a win worth no score, then cumulative score.
pub fn calculate_swiss_final_standings(
    agents: &[AgentConfig],
    rounds: &[TournamentRound],
) -> Vec<TournamentStanding> {
    rank_by_record(agents, &tally(rounds, true))
}

/// Champion first, then by how late the agent was knocked out, then by score.
pub fn calculate_single_elimination_standings(
    agents: &[AgentConfig],
    rounds: &[TournamentRound],
) -> Vec<TournamentStanding> {
    let records = tally(rounds, false);
    let eliminated: HashMap<&str, usize> = rounds
        .iter()
        .flat_map(|r| r.matches.iter().map(move |m| (r.round_number, m)))
        .filter_map(|(round_number, m)| m.loser_id.as_deref().map(|id| (id, round_number)))
        .collect();

    let empty = Record::default();
    let mut standings: Vec<TournamentStanding> = agents
        .iter()
        .map(|agent| {
            standing(
                agent,
                records.get(&agent.id).unwrap_or(&empty),
                eliminated.get(agent.id.as_str()).copied(),
            )
        })
        .collect();
    standings.sort_by(|a, b| {
        let survived = |s: &TournamentStanding| s.round_eliminated.unwrap_or(usize::MAX);
        survived(b)
            .cmp(&survived(a))
            .then(b.matches_won.cmp(&a.matches_won))
            .then(b.total_score.cmp(&a.total_score))
    });
    for (i, s) in standings.iter_mut().enumerate() {
        s.rank = i + 1;
    }
    standings
}
