//! End-to-end flow: client input replicator -> command channel -> arena tick

use std::sync::Arc;

use glam::{Vec2, Vec3};
use tokio::sync::mpsc;
use uuid::Uuid;

use knockout_arena::config::tuning::Placement;
use knockout_arena::config::Tuning;
use knockout_arena::game::input::InputTuning;
use knockout_arena::game::{Arena, Command, CommandSink, InputReplicator, PlayerInput, SendError};
use knockout_arena::util::time::{tick_delta, unix_millis};
use knockout_arena::ws::protocol::{ClientMsg, GameEvent, RoundPhase, Strike};

/// Attacker at the origin facing +Z, target one metre ahead
fn face_off_tuning(min_players: usize) -> Tuning {
    let mut tuning = Tuning::default();
    tuning.arena.spawn_points = vec![
        Placement::new(Vec3::ZERO, 0.0),
        Placement::new(Vec3::new(0.0, 0.0, 1.0), 0.0),
        Placement::new(Vec3::new(5.0, 0.0, -5.0), 0.0),
    ];
    tuning.round.min_players_to_start = min_players;
    tuning
}

fn join(arena: &mut Arena, user_id: Uuid) {
    arena.handle_input(PlayerInput {
        user_id,
        msg: ClientMsg::JoinArena {
            display_name: Some("Tester".into()),
        },
        received_at: unix_millis(),
    });
}

/// Hand everything the client queued to the arena, as the socket reader does
fn pump(arena: &mut Arena, user_id: Uuid, rx: &mut mpsc::Receiver<ClientMsg>) {
    while let Ok(msg) = rx.try_recv() {
        arena.handle_input(PlayerInput {
            user_id,
            msg,
            received_at: unix_millis(),
        });
    }
}

fn pin(arena: &mut Arena, user_id: Uuid, position: Vec3) {
    if let Some(fighter) = arena.state_mut().fighter_mut(user_id) {
        fighter.body.position = position;
        fighter.body.velocity = Vec3::ZERO;
    }
}

#[tokio::test]
async fn dash_from_client_spends_stamina_once() {
    let (mut arena, _handle) = Arena::new(Uuid::new_v4(), 1, Arc::new(face_off_tuning(10)), 8);
    let (mut tx, mut rx) = mpsc::channel::<ClientMsg>(16);
    let player = Uuid::new_v4();
    join(&mut arena, player);

    let mut client = InputReplicator::new(InputTuning::default(), true);
    client.on_move(Vec2::new(0.0, 1.0));
    client.on_dash();
    let sent = client.frame(tick_delta(), &mut tx).unwrap();
    assert!(sent.dash_pressed);

    pump(&mut arena, player, &mut rx);
    let events = arena.step();
    assert!(events
        .iter()
        .any(|e| matches!(e, GameEvent::Dash { user_id } if *user_id == player)));

    // Later frames carry no edge, so no second dash even after cooldown
    for _ in 0..30 {
        client.frame(tick_delta(), &mut tx);
        pump(&mut arena, player, &mut rx);
        let events = arena.step();
        assert!(events.iter().all(|e| !matches!(e, GameEvent::Dash { .. })));
    }

    let fighter = arena.state().fighter(player).unwrap();
    let stamina = fighter.economy.as_ref().unwrap().stamina();
    assert!(stamina < 75.0 && stamina > 70.0, "stamina was {stamina}");
}

#[tokio::test]
async fn full_queue_keeps_edge_for_next_frame() {
    let (mut arena, _handle) = Arena::new(Uuid::new_v4(), 2, Arc::new(face_off_tuning(10)), 8);
    let (mut tx, mut rx) = mpsc::channel::<ClientMsg>(1);
    let player = Uuid::new_v4();
    join(&mut arena, player);

    let mut client = InputReplicator::new(InputTuning::default(), true);
    assert!(client.frame(tick_delta(), &mut tx).is_some());

    client.on_dash();
    assert_eq!(
        tx.send_command(Command::default()),
        Err(SendError::QueueFull)
    );
    assert!(client.frame(tick_delta(), &mut tx).is_none());

    pump(&mut arena, player, &mut rx);
    let sent = client.frame(tick_delta(), &mut tx).unwrap();
    assert!(sent.dash_pressed);

    pump(&mut arena, player, &mut rx);
    let events = arena.step();
    assert!(events.iter().any(|e| matches!(e, GameEvent::Dash { .. })));
}

#[tokio::test]
async fn three_punches_charge_a_kick_that_lands() {
    let (mut arena, _handle) = Arena::new(Uuid::new_v4(), 3, Arc::new(face_off_tuning(10)), 8);
    let (mut tx, mut rx) = mpsc::channel::<ClientMsg>(16);
    let attacker = Uuid::new_v4();
    let target = Uuid::new_v4();
    join(&mut arena, attacker);
    join(&mut arena, target);

    let mut client = InputReplicator::new(InputTuning::default(), true);
    client.on_punch(true);

    let mut punches = 0;
    for _ in 0..200 {
        pin(&mut arena, attacker, Vec3::ZERO);
        pin(&mut arena, target, Vec3::new(0.0, 0.0, 1.0));
        client.frame(tick_delta(), &mut tx);
        pump(&mut arena, attacker, &mut rx);
        punches += arena
            .step()
            .iter()
            .filter(|e| matches!(e, GameEvent::Hit { strike: Strike::Punch, .. }))
            .count();

        let power = arena.state().fighter(attacker).unwrap().economy.as_ref().unwrap().power();
        if power == 3 {
            break;
        }
    }
    assert_eq!(punches, 3);

    client.on_punch(false);
    client.on_kick();

    let mut kick_started = false;
    let mut kick_landed = None;
    for _ in 0..30 {
        pin(&mut arena, attacker, Vec3::ZERO);
        pin(&mut arena, target, Vec3::new(0.0, 0.0, 1.0));
        client.frame(tick_delta(), &mut tx);
        pump(&mut arena, attacker, &mut rx);
        for event in arena.step() {
            match event {
                GameEvent::KickStarted { user_id } if user_id == attacker => kick_started = true,
                GameEvent::Hit {
                    strike: Strike::Kick,
                    target_id,
                    impulse,
                    ..
                } if target_id == target => kick_landed = Some(impulse),
                _ => {}
            }
        }
        if kick_landed.is_some() {
            break;
        }
    }

    assert!(kick_started);
    let impulse = kick_landed.expect("kick should connect during its active window");
    assert!(impulse[2] > 2.0, "kick pushes the target away: {impulse:?}");
    let attacker_state = arena.state().fighter(attacker).unwrap();
    assert_eq!(attacker_state.economy.as_ref().unwrap().power(), 0);
}

#[tokio::test]
async fn knockout_after_punch_credits_the_puncher() {
    let (mut arena, _handle) = Arena::new(Uuid::new_v4(), 4, Arc::new(face_off_tuning(2)), 8);
    let (mut tx, mut rx) = mpsc::channel::<ClientMsg>(16);
    let attacker = Uuid::new_v4();
    let victim = Uuid::new_v4();
    let bystander = Uuid::new_v4();
    join(&mut arena, attacker);
    join(&mut arena, victim);
    join(&mut arena, bystander);
    arena.step();
    assert_eq!(arena.state().phase, RoundPhase::InRound);

    // Spawn slots are shuffled at round start
    pin(&mut arena, attacker, Vec3::ZERO);
    pin(&mut arena, victim, Vec3::new(0.0, 0.0, 1.0));
    pin(&mut arena, bystander, Vec3::new(5.0, 0.0, -5.0));

    let mut client = InputReplicator::new(InputTuning::default(), true);
    client.on_punch(true);
    client.frame(tick_delta(), &mut tx);
    pump(&mut arena, attacker, &mut rx);
    let events = arena.step();
    assert!(events.iter().any(|e| matches!(
        e,
        GameEvent::Hit { attacker_id, target_id, .. } if *attacker_id == attacker && *target_id == victim
    )));

    pin(&mut arena, victim, Vec3::new(0.0, -10.0, 0.0));
    let events = arena.step();
    assert!(events.iter().any(|e| matches!(
        e,
        GameEvent::Knockout { victim_id, credited_attacker_id: Some(by) }
            if *victim_id == victim && *by == attacker
    )));

    let state = arena.state();
    assert_eq!(state.fighter(attacker).unwrap().knockouts, 1);
    assert!(!state.fighter(victim).unwrap().is_active());
    assert_eq!(state.phase, RoundPhase::InRound);
    assert_eq!(state.alive_count(), 2);
}
