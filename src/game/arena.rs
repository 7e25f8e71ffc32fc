//! Arena state, round flow and the authoritative tick loop

use dashmap::DashMap;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Tuning;
use crate::util::time::{tick_delta, SimClock, SimTime, SIMULATION_TPS, SNAPSHOT_TPS};
use crate::ws::protocol::{ClientMsg, GameEvent, Outbound, PlayerInfo, RoundPhase, ServerMsg};

use super::combat::{EntityKind, HitTarget};
use super::command::Command;
use super::fighter::{sanitize_display_name, Fighter, Prop};
use super::physics::{PhysicsSystem, RigidBody};
use super::snapshot::SnapshotBuilder;
use super::PlayerInput;

/// Arena state (owned by the arena task)
pub struct ArenaState {
    pub id: Uuid,
    pub seed: u64,
    pub clock: SimClock,
    pub phase: RoundPhase,
    pub round_time_remaining: f32,
    pub round_end_remaining: f32,
    pub fighters: Vec<Fighter>,
    pub props: Vec<Prop>,
    pub rng: ChaCha8Rng,
    pub max_players: usize,
}

impl ArenaState {
    pub fn new(id: Uuid, seed: u64, max_players: usize, tuning: &Tuning) -> Self {
        Self {
            id,
            seed,
            clock: SimClock::new(),
            phase: RoundPhase::WaitingForPlayers,
            round_time_remaining: 0.0,
            round_end_remaining: 0.0,
            fighters: Vec::new(),
            props: tuning
                .arena
                .props
                .iter()
                .map(|spawn| Prop::spawn(spawn, tuning))
                .collect(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            max_players,
        }
    }

    pub fn fighter(&self, user_id: Uuid) -> Option<&Fighter> {
        self.fighters.iter().find(|f| f.user_id == user_id)
    }

    pub fn fighter_mut(&mut self, user_id: Uuid) -> Option<&mut Fighter> {
        self.fighters.iter_mut().find(|f| f.user_id == user_id)
    }

    /// Fighters still in play
    pub fn alive_count(&self) -> usize {
        self.fighters.iter().filter(|f| f.is_active()).count()
    }

    pub fn player_infos(&self) -> Vec<PlayerInfo> {
        self.fighters.iter().map(Fighter::info).collect()
    }
}

/// Handle to a running arena
#[derive(Clone)]
pub struct ArenaHandle {
    pub id: Uuid,
    pub input_tx: mpsc::Sender<PlayerInput>,
    pub outbound_tx: broadcast::Sender<Outbound>,
    pub player_count: Arc<AtomicUsize>,
    /// Slots promised to connections whose join has not reached the arena yet
    pub pending_joins: Arc<AtomicUsize>,
}

impl ArenaHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    pub fn has_room(&self, max_players: usize) -> bool {
        self.player_count() + self.pending_joins.load(Ordering::Relaxed) < max_players
    }

    /// Claim a slot ahead of the join message. False when the arena is full.
    pub fn try_reserve(&self, max_players: usize) -> bool {
        self.pending_joins
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |pending| {
                (self.player_count() + pending < max_players).then_some(pending + 1)
            })
            .is_ok()
    }

    /// Give back a slot whose join never reached the arena
    pub fn release_reservation(&self) {
        release(&self.pending_joins);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.outbound_tx.subscribe()
    }
}

/// Registry of all running arenas
pub struct ArenaRegistry {
    arenas: DashMap<Uuid, ArenaHandle>,
    tuning: Arc<Tuning>,
    max_players: usize,
    max_arenas: usize,
}

impl ArenaRegistry {
    pub fn new(tuning: Arc<Tuning>, max_players: usize, max_arenas: usize) -> Self {
        Self {
            arenas: DashMap::new(),
            tuning,
            max_players: max_players.max(1),
            max_arenas: max_arenas.max(1),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<ArenaHandle> {
        self.arenas.get(id).map(|a| a.value().clone())
    }

    pub fn remove(&self, id: &Uuid) -> Option<ArenaHandle> {
        self.arenas.remove(id).map(|(_, h)| h)
    }

    pub fn handles(&self) -> Vec<ArenaHandle> {
        self.arenas.iter().map(|a| a.value().clone()).collect()
    }

    pub fn active_arenas(&self) -> usize {
        self.arenas.len()
    }

    pub fn total_players(&self) -> usize {
        self.arenas.iter().map(|a| a.value().player_count()).sum()
    }

    pub fn max_players(&self) -> usize {
        self.max_players
    }

    /// Find an arena with a free slot
    pub fn find_available(&self) -> Option<ArenaHandle> {
        self.arenas
            .iter()
            .find(|a| a.value().has_room(self.max_players))
            .map(|a| a.value().clone())
    }

    /// Find an arena with a free slot and reserve it for one joiner
    fn reserve_available(&self) -> Option<ArenaHandle> {
        self.arenas
            .iter()
            .find(|a| a.value().try_reserve(self.max_players))
            .map(|a| a.value().clone())
    }

    /// No arena has room and no more may be started
    pub fn is_full(&self) -> bool {
        self.arenas.len() >= self.max_arenas && self.find_available().is_none()
    }

    /// An arena with a slot reserved for the caller, spawning a new arena
    /// task if needed. None when every arena is full and no more may be
    /// started. The reservation is released when the join is handled.
    pub fn join_or_create(self: &Arc<Self>) -> Option<ArenaHandle> {
        if let Some(handle) = self.reserve_available() {
            return Some(handle);
        }
        if self.arenas.len() >= self.max_arenas {
            warn!(max_arenas = self.max_arenas, "Arena limit reached");
            return None;
        }

        let id = Uuid::new_v4();
        let (arena, handle) = Arena::new(id, rand::random(), self.tuning.clone(), self.max_players);
        handle.pending_joins.fetch_add(1, Ordering::AcqRel);
        self.arenas.insert(id, handle.clone());

        let registry = Arc::clone(self);
        tokio::spawn(async move {
            arena.run().await;
            registry.remove(&id);
        });

        Some(handle)
    }
}

/// The authoritative arena
pub struct Arena {
    state: ArenaState,
    tuning: Arc<Tuning>,
    input_rx: mpsc::Receiver<PlayerInput>,
    outbound_tx: broadcast::Sender<Outbound>,
    snapshot_builder: SnapshotBuilder,
    player_count: Arc<AtomicUsize>,
    pending_joins: Arc<AtomicUsize>,
    had_players: bool,
}

fn release(pending_joins: &AtomicUsize) {
    // Joins that arrive without a reservation (tests, direct input) leave it at zero
    let _ = pending_joins.fetch_update(Ordering::AcqRel, Ordering::Acquire, |p| p.checked_sub(1));
}

impl Arena {
    pub fn new(id: Uuid, seed: u64, tuning: Arc<Tuning>, max_players: usize) -> (Self, ArenaHandle) {
        let (input_tx, input_rx) = mpsc::channel(256);
        let (outbound_tx, _) = broadcast::channel(128);
        let player_count = Arc::new(AtomicUsize::new(0));
        let pending_joins = Arc::new(AtomicUsize::new(0));

        let handle = ArenaHandle {
            id,
            input_tx,
            outbound_tx: outbound_tx.clone(),
            player_count: player_count.clone(),
            pending_joins: pending_joins.clone(),
        };

        let arena = Self {
            state: ArenaState::new(id, seed, max_players, &tuning),
            tuning,
            input_rx,
            outbound_tx,
            snapshot_builder: SnapshotBuilder::new(SIMULATION_TPS / SNAPSHOT_TPS),
            player_count,
            pending_joins,
            had_players: false,
        };

        (arena, handle)
    }

    pub fn state(&self) -> &ArenaState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ArenaState {
        &mut self.state
    }

    pub fn now(&self) -> SimTime {
        self.state.clock.now()
    }

    /// Run the fixed-timestep loop until the last player leaves
    pub async fn run(mut self) {
        info!(arena_id = %self.state.id, seed = self.state.seed, "Arena started");

        let tick_duration = Duration::from_micros(1_000_000 / SIMULATION_TPS as u64);
        let mut tick_interval = interval(tick_duration);
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;

            self.process_inputs();
            self.step();

            if self.had_players && self.state.fighters.is_empty() {
                info!(arena_id = %self.state.id, "All players left, closing arena");
                break;
            }
        }
    }

    /// Drain everything that arrived since the previous tick
    pub fn process_inputs(&mut self) {
        while let Ok(input) = self.input_rx.try_recv() {
            self.handle_input(input);
        }
    }

    pub fn handle_input(&mut self, input: PlayerInput) {
        match input.msg {
            ClientMsg::JoinArena { display_name } => {
                self.handle_join(input.user_id, display_name.as_deref());
            }
            ClientMsg::Command {
                move_x,
                move_y,
                look_x,
                punch,
                block,
                dash,
                kick,
            } => {
                let command = Command::from_wire(move_x, move_y, look_x, punch, block, dash, kick);
                if let Some(fighter) = self.state.fighter_mut(input.user_id) {
                    fighter.submit_command(command);
                }
            }
            ClientMsg::Ping { t } => {
                self.send(Outbound::owner(input.user_id, ServerMsg::Pong { t }));
            }
            ClientMsg::LeaveArena => {
                self.handle_leave(input.user_id);
            }
        }
    }

    fn handle_join(&mut self, user_id: Uuid, requested_name: Option<&str>) {
        if self.state.fighter(user_id).is_some() {
            release(&self.pending_joins);
            warn!(arena_id = %self.state.id, user_id = %user_id, "Player already in arena");
            return;
        }

        if self.state.fighters.len() >= self.state.max_players {
            release(&self.pending_joins);
            self.send(Outbound::owner(
                user_id,
                ServerMsg::Error {
                    code: "arena_full".to_string(),
                    message: "Arena is full".to_string(),
                },
            ));
            return;
        }

        let display_name = sanitize_display_name(requested_name, user_id);
        let spawn = self.tuning.arena.spawn_point(self.state.fighters.len());
        let mut fighter = Fighter::spawn(user_id, display_name, spawn, &self.tuning);

        // Mid-round joiners wait out the round as spectators
        let spectating = self.state.phase != RoundPhase::WaitingForPlayers;
        if spectating {
            fighter.eliminate_to_spectator(self.tuning.arena.spectator_point);
        }

        let info = fighter.info();
        self.state.fighters.push(fighter);
        self.had_players = true;
        self.player_count
            .store(self.state.fighters.len(), Ordering::Relaxed);
        release(&self.pending_joins);

        // Late joiner needs every fighter's full animation state
        for fighter in &mut self.state.fighters {
            fighter.mark_all_dirty();
        }
        self.snapshot_builder.force_next();

        self.send(Outbound::everyone(ServerMsg::PlayerJoined { player: info }));
        self.send(Outbound::owner(
            user_id,
            ServerMsg::ArenaJoined {
                arena_id: self.state.id,
                players: self.state.player_infos(),
                phase: self.state.phase,
            },
        ));
        if spectating {
            self.send_enter_spectator(user_id);
        }

        info!(
            arena_id = %self.state.id,
            user_id = %user_id,
            player_count = self.state.fighters.len(),
            "Player joined arena"
        );
    }

    fn handle_leave(&mut self, user_id: Uuid) {
        let before = self.state.fighters.len();
        self.state.fighters.retain(|f| f.user_id != user_id);
        if self.state.fighters.len() == before {
            return;
        }

        self.player_count
            .store(self.state.fighters.len(), Ordering::Relaxed);
        self.send(Outbound::everyone(ServerMsg::PlayerLeft {
            user_id,
            reason: "disconnected".to_string(),
        }));

        info!(arena_id = %self.state.id, user_id = %user_id, "Player left arena");
    }

    /// One fixed simulation tick. Returns the events it produced.
    pub fn step(&mut self) -> Vec<GameEvent> {
        let dt = tick_delta();
        let now = self.state.clock.advance(dt);
        let mut events = Vec::new();

        self.control_fighters(now, dt, &mut events);
        self.integrate_bodies(dt);
        self.resolve_hits(now, &mut events);

        for fighter in &mut self.state.fighters {
            fighter.update_resources(dt);
            fighter.end_tick();
        }

        self.detect_knockouts(now, &mut events);
        self.update_round(dt);
        self.replicate(&events);

        events
    }

    fn control_fighters(&mut self, now: SimTime, dt: f32, events: &mut Vec<GameEvent>) {
        let floor = &self.tuning.arena.floor;
        for fighter in &mut self.state.fighters {
            let report = fighter.control(floor, now, dt);
            if report.dashed {
                events.push(GameEvent::Dash {
                    user_id: fighter.user_id,
                });
            }
            if report.kick_started {
                events.push(GameEvent::KickStarted {
                    user_id: fighter.user_id,
                });
            }
        }
    }

    fn integrate_bodies(&mut self, dt: f32) {
        let floor = &self.tuning.arena.floor;
        for fighter in &mut self.state.fighters {
            PhysicsSystem::integrate(&mut fighter.body, floor, dt);
        }
        for prop in &mut self.state.props {
            PhysicsSystem::integrate(&mut prop.body, floor, dt);
        }

        // Fighter-to-fighter push apart
        let fighters = &mut self.state.fighters;
        for j in 1..fighters.len() {
            let (head, tail) = fighters.split_at_mut(j);
            let b = &mut tail[0];
            for a in head.iter_mut() {
                if !a.is_active() || !b.is_active() {
                    continue;
                }
                if PhysicsSystem::check_body_collision(&a.body, &b.body) {
                    PhysicsSystem::resolve_body_collision(&mut a.body, &mut b.body);
                }
            }
        }
    }

    /// Collect hits against a read-only view of every target, then apply them
    fn resolve_hits(&mut self, now: SimTime, events: &mut Vec<GameEvent>) {
        let targets: Vec<(HitTarget, RigidBody)> = self
            .state
            .fighters
            .iter()
            .filter(|f| f.is_active())
            .map(|f| (f.hit_target(), f.body.clone()))
            .chain(self.state.props.iter().map(|p| (p.hit_target(), p.body.clone())))
            .collect();

        let mut hits = Vec::new();
        for attacker in &mut self.state.fighters {
            for (target, body) in &targets {
                if let Some(hit) = attacker.try_strike(target, body, now) {
                    hits.push(hit);
                }
            }
        }

        for hit in hits {
            let applied = match hit.target_kind {
                EntityKind::Fighter => match self.state.fighter_mut(hit.target_id) {
                    Some(target) => {
                        target.apply_hit(&hit, now);
                        true
                    }
                    None => false,
                },
                EntityKind::Prop => match self.state.props.iter_mut().find(|p| p.id == hit.target_id) {
                    Some(prop) => {
                        prop.apply_hit(&hit);
                        true
                    }
                    None => false,
                },
            };
            if !applied {
                continue;
            }

            debug!(
                arena_id = %self.state.id,
                attacker_id = %hit.attacker_id,
                target_id = %hit.target_id,
                strike = ?hit.strike,
                "Hit resolved"
            );
            events.push(GameEvent::Hit {
                attacker_id: hit.attacker_id,
                target_id: hit.target_id,
                strike: hit.strike,
                impulse: hit.impulse.to_array(),
            });
        }
    }

    fn detect_knockouts(&mut self, now: SimTime, events: &mut Vec<GameEvent>) {
        let knockout_height = self.tuning.arena.knockout_height;

        let fallen: Vec<(Uuid, usize)> = self
            .state
            .fighters
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_active() && f.is_below(knockout_height))
            .map(|(i, f)| (f.user_id, i))
            .collect();

        for (victim_id, index) in fallen {
            if self.state.phase == RoundPhase::InRound {
                self.knock_out(victim_id, now, events);
            } else if let Some(fighter) = self.state.fighter_mut(victim_id) {
                // Outside a round a fall just sends the fighter back
                fighter.restore_for_round(self.tuning.arena.spawn_point(index));
            }
        }

        for prop in &mut self.state.props {
            if prop.body.position.y < knockout_height {
                prop.reset();
            }
        }
    }

    fn knock_out(&mut self, victim_id: Uuid, now: SimTime, events: &mut Vec<GameEvent>) {
        let spectator = self.tuning.arena.spectator_point;
        let Some(victim) = self.state.fighter_mut(victim_id) else {
            return;
        };

        let credited = victim.elimination.credited_attacker_or_none(now);
        if !victim.eliminate_to_spectator(spectator) {
            return;
        }

        if let Some(attacker) = credited.and_then(|id| self.state.fighter_mut(id)) {
            attacker.knockouts += 1;
        }

        info!(
            arena_id = %self.state.id,
            victim_id = %victim_id,
            credited_attacker_id = ?credited,
            alive = self.state.alive_count(),
            "Knockout"
        );

        events.push(GameEvent::Knockout {
            victim_id,
            credited_attacker_id: credited,
        });
        self.send_enter_spectator(victim_id);
        self.snapshot_builder.force_next();
    }

    fn update_round(&mut self, dt: f32) {
        match self.state.phase {
            RoundPhase::WaitingForPlayers => self.try_start_round(),
            RoundPhase::InRound => {
                self.state.round_time_remaining -= dt;
                if self.state.alive_count() <= 1 {
                    self.state.round_time_remaining = 0.0;
                }
                if self.state.round_time_remaining <= 0.0 {
                    self.end_round();
                }
            }
            RoundPhase::RoundEnd => {
                self.state.round_end_remaining -= dt;
                if self.state.round_end_remaining <= 0.0 {
                    self.state.phase = RoundPhase::WaitingForPlayers;
                    self.respawn_everyone();
                    self.broadcast_round_state();
                    self.try_start_round();
                }
            }
        }
    }

    fn try_start_round(&mut self) {
        if self.state.phase != RoundPhase::WaitingForPlayers
            || self.state.fighters.len() < self.tuning.round.min_players_to_start.max(1)
        {
            return;
        }

        self.state.phase = RoundPhase::InRound;
        self.state.round_time_remaining = self.tuning.round.round_duration_seconds;
        self.respawn_everyone();
        self.broadcast_round_state();

        info!(
            arena_id = %self.state.id,
            players = self.state.fighters.len(),
            "Round started"
        );
    }

    fn end_round(&mut self) {
        self.state.phase = RoundPhase::RoundEnd;
        self.state.round_time_remaining = 0.0;
        self.state.round_end_remaining = self.tuning.round.round_end_delay_seconds;

        let winner = self
            .state
            .fighters
            .iter()
            .find(|f| f.is_active())
            .map(|f| f.user_id);
        info!(arena_id = %self.state.id, winner = ?winner, "Round ended");

        self.broadcast_round_state();
    }

    /// Shuffled spawn points, fresh resources, spectators back in play
    fn respawn_everyone(&mut self) {
        let mut order: Vec<usize> = (0..self.state.fighters.len()).collect();
        order.shuffle(&mut self.state.rng);

        let mut returning = Vec::new();
        for (fighter, slot) in self.state.fighters.iter_mut().zip(order) {
            if !fighter.is_active() {
                returning.push(fighter.user_id);
            }
            fighter.restore_for_round(self.tuning.arena.spawn_point(slot));
        }
        for prop in &mut self.state.props {
            prop.reset();
        }

        for user_id in returning {
            self.send(Outbound::owner(user_id, ServerMsg::ExitSpectator));
        }
        self.snapshot_builder.force_next();
    }

    fn broadcast_round_state(&self) {
        self.send(Outbound::everyone(ServerMsg::RoundState {
            phase: self.state.phase,
            time_remaining: self.state.round_time_remaining.max(0.0),
            players: self.state.player_infos(),
        }));
    }

    fn send_enter_spectator(&self, user_id: Uuid) {
        let at = self.tuning.arena.spectator_point;
        self.send(Outbound::owner(
            user_id,
            ServerMsg::EnterSpectator {
                x: at.position.x,
                y: at.position.y,
                z: at.position.z,
                yaw: at.yaw,
            },
        ));
    }

    fn replicate(&mut self, events: &[GameEvent]) {
        self.snapshot_builder.queue_events(events.to_vec());
        if !self.snapshot_builder.should_send() {
            return;
        }

        let snapshot = self.snapshot_builder.build(
            self.state.clock.tick(),
            self.state.fighters.iter_mut(),
            &self.state.props,
        );
        self.send(Outbound::everyone(snapshot));

        for update in SnapshotBuilder::resource_updates(self.state.fighters.iter_mut()) {
            self.send(update);
        }
    }

    fn send(&self, outbound: Outbound) {
        // No subscribers is fine; clients come and go
        let _ = self.outbound_tx.send(outbound);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::time::unix_millis;
    use glam::Vec3;

    fn arena_with(tuning: Tuning) -> (Arena, ArenaHandle) {
        Arena::new(Uuid::new_v4(), 7, Arc::new(tuning), 8)
    }

    fn input(user_id: Uuid, msg: ClientMsg) -> PlayerInput {
        PlayerInput {
            user_id,
            msg,
            received_at: unix_millis(),
        }
    }

    fn join(arena: &mut Arena, user_id: Uuid) {
        arena.handle_input(input(user_id, ClientMsg::JoinArena { display_name: None }));
    }

    #[test]
    fn round_starts_at_min_players() {
        let (mut arena, _handle) = arena_with(Tuning::default());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        join(&mut arena, a);
        arena.step();
        assert_eq!(arena.state().phase, RoundPhase::WaitingForPlayers);

        join(&mut arena, b);
        arena.step();
        assert_eq!(arena.state().phase, RoundPhase::InRound);
        assert_eq!(arena.state().alive_count(), 2);
    }

    #[test]
    fn mid_round_joiner_spectates_until_next_round() {
        let (mut arena, handle) = arena_with(Tuning::default());
        join(&mut arena, Uuid::new_v4());
        join(&mut arena, Uuid::new_v4());
        arena.step();

        let mut rx = handle.subscribe();
        let late = Uuid::new_v4();
        join(&mut arena, late);
        assert!(!arena.state().fighter(late).unwrap().is_active());

        let mut saw_spectator = false;
        while let Ok(out) = rx.try_recv() {
            if matches!(out.msg, ServerMsg::EnterSpectator { .. }) {
                assert_eq!(out.audience, crate::ws::protocol::Audience::Owner(late));
                saw_spectator = true;
            }
        }
        assert!(saw_spectator);
    }

    #[test]
    fn falling_off_in_round_is_a_credited_knockout() {
        let (mut arena, _handle) = arena_with(Tuning::default());
        let attacker = Uuid::new_v4();
        let victim = Uuid::new_v4();
        let third = Uuid::new_v4();
        for id in [attacker, victim, third] {
            join(&mut arena, id);
        }
        arena.step();
        assert_eq!(arena.state().phase, RoundPhase::InRound);

        let now = arena.now();
        let fighter = arena.state.fighter_mut(victim).unwrap();
        fighter.elimination.record_attacker(attacker, now);
        fighter.body.position = Vec3::new(0.0, -10.0, 0.0);

        let events = arena.step();
        assert!(events.iter().any(|e| matches!(
            e,
            GameEvent::Knockout { victim_id, credited_attacker_id: Some(id) }
                if *victim_id == victim && *id == attacker
        )));
        assert_eq!(arena.state().fighter(attacker).unwrap().knockouts, 1);
        assert!(!arena.state().fighter(victim).unwrap().is_active());
        assert_eq!(arena.state().phase, RoundPhase::InRound);
    }

    #[test]
    fn last_fighter_standing_ends_round_then_everyone_respawns() {
        let tuning = Tuning {
            round: crate::config::tuning::RoundTuning {
                round_end_delay_seconds: 0.1,
                ..Default::default()
            },
            ..Tuning::default()
        };
        let (mut arena, _handle) = arena_with(tuning);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        join(&mut arena, a);
        join(&mut arena, b);
        arena.step();

        arena.state.fighter_mut(b).unwrap().body.position.y = -10.0;
        arena.step();
        assert_eq!(arena.state().phase, RoundPhase::RoundEnd);

        for _ in 0..6 {
            arena.step();
        }
        // Round restarts immediately with both players back in.
        assert_eq!(arena.state().phase, RoundPhase::InRound);
        assert!(arena.state().fighter(b).unwrap().is_active());
    }

    #[test]
    fn fall_outside_round_respawns_without_knockout() {
        let (mut arena, _handle) = arena_with(Tuning::default());
        let solo = Uuid::new_v4();
        join(&mut arena, solo);
        arena.state.fighter_mut(solo).unwrap().body.position.y = -10.0;

        let events = arena.step();
        assert!(events.iter().all(|e| !matches!(e, GameEvent::Knockout { .. })));
        let fighter = arena.state().fighter(solo).unwrap();
        assert!(fighter.is_active());
        assert!(fighter.body.position.y > -1.0);
    }

    #[test]
    fn punch_in_range_knocks_target_back() {
        let mut tuning = Tuning::default();
        tuning.arena.spawn_points = vec![
            crate::config::tuning::Placement::new(Vec3::ZERO, 0.0),
            crate::config::tuning::Placement::new(Vec3::new(0.0, 0.0, 1.0), 0.0),
        ];
        tuning.round.min_players_to_start = 10;
        let (mut arena, _handle) = arena_with(tuning);
        let attacker = Uuid::new_v4();
        let target = Uuid::new_v4();
        join(&mut arena, attacker);
        join(&mut arena, target);

        arena.handle_input(input(
            attacker,
            ClientMsg::Command {
                move_x: 0.0,
                move_y: 0.0,
                look_x: 0.0,
                punch: true,
                block: false,
                dash: false,
                kick: false,
            },
        ));
        let events = arena.step();

        assert!(events.iter().any(|e| matches!(
            e,
            GameEvent::Hit { attacker_id, target_id, .. }
                if *attacker_id == attacker && *target_id == target
        )));
        let hit = arena.state().fighter(target).unwrap();
        assert!(hit.body.velocity.z > 3.0);
        assert_eq!(hit.elimination.credit().map(|c| c.attacker_id), Some(attacker));
        assert_eq!(arena.state().fighter(attacker).unwrap().economy.as_ref().unwrap().power(), 1);
    }

    #[test]
    fn leave_removes_fighter_and_updates_count() {
        let (mut arena, handle) = arena_with(Tuning::default());
        let id = Uuid::new_v4();
        join(&mut arena, id);
        assert_eq!(handle.player_count(), 1);

        arena.handle_input(input(id, ClientMsg::LeaveArena));
        assert_eq!(handle.player_count(), 0);
        assert!(arena.state().fighter(id).is_none());
    }

    #[test]
    fn queued_inputs_apply_on_next_drain() {
        let (mut arena, handle) = arena_with(Tuning::default());
        let id = Uuid::new_v4();

        tokio_test::assert_ok!(tokio_test::block_on(
            handle
                .input_tx
                .send(input(id, ClientMsg::JoinArena { display_name: Some("Late".into()) }))
        ));
        assert!(arena.state().fighter(id).is_none());

        arena.process_inputs();
        assert_eq!(arena.state().fighter(id).unwrap().display_name, "Late");
        assert_eq!(handle.player_count(), 1);
    }

    #[tokio::test]
    async fn registry_reuses_arena_with_room() {
        let registry = Arc::new(ArenaRegistry::new(Arc::new(Tuning::default()), 2, 4));
        let first = registry.join_or_create().unwrap();
        let second = registry.join_or_create().unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(registry.active_arenas(), 1);

        let third = registry.join_or_create().unwrap();
        assert_ne!(first.id, third.id);
        assert_eq!(registry.active_arenas(), 2);
    }

    #[tokio::test]
    async fn reservations_cap_concurrent_joiners() {
        let registry = Arc::new(ArenaRegistry::new(Arc::new(Tuning::default()), 2, 1));
        let first = registry.join_or_create().unwrap();
        let second = registry.join_or_create().unwrap();
        assert_eq!(first.id, second.id);

        // Neither join has reached the arena task, yet both slots are taken
        assert_eq!(first.player_count(), 0);
        assert!(registry.join_or_create().is_none());
        assert!(registry.is_full());

        second.release_reservation();
        assert!(!registry.is_full());
        assert!(registry.join_or_create().is_some());
    }

    #[test]
    fn join_past_capacity_is_refused_to_the_joiner_only() {
        let (mut arena, handle) = Arena::new(Uuid::new_v4(), 7, Arc::new(Tuning::default()), 1);
        let mut rx = handle.subscribe();
        let seated = Uuid::new_v4();
        let extra = Uuid::new_v4();
        assert!(handle.try_reserve(1));
        join(&mut arena, seated);
        assert!(!handle.try_reserve(1));
        join(&mut arena, extra);

        assert!(arena.state().fighter(extra).is_none());
        assert_eq!(handle.player_count(), 1);
        assert_eq!(handle.pending_joins.load(Ordering::Relaxed), 0);

        let refusal = std::iter::from_fn(|| rx.try_recv().ok())
            .find(|out| matches!(&out.msg, ServerMsg::Error { code, .. } if code == "arena_full"))
            .expect("refusal sent");
        assert_eq!(refusal.audience, crate::ws::protocol::Audience::Owner(extra));
    }

    #[test]
    fn handled_join_releases_its_reservation() {
        let (mut arena, handle) = arena_with(Tuning::default());
        assert!(handle.try_reserve(8));
        assert_eq!(handle.pending_joins.load(Ordering::Relaxed), 1);

        join(&mut arena, Uuid::new_v4());
        assert_eq!(handle.pending_joins.load(Ordering::Relaxed), 0);
        assert_eq!(handle.player_count(), 1);

        // Unreserved joins never underflow
        join(&mut arena, Uuid::new_v4());
        assert_eq!(handle.pending_joins.load(Ordering::Relaxed), 0);
    }
}
