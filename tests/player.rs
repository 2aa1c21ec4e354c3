use approx::assert_relative_eq;

use track_splitter_core::{
    player::{TrackState, MAX_RATE, MIN_RATE},
    MultiTrackPlayer, SplitterError, TickOutcome, TrackHandle,
};

/// Track whose clock only moves when the test says so.
#[derive(Debug, Default)]
struct ManualTrack {
    duration: Option<f64>,
    position: f64,
    playing: bool,
    rate: f64,
    volume: f32,
    seeks: usize,
}

impl ManualTrack {
    fn with_duration(duration: f64) -> Self {
        Self {
            duration: Some(duration),
            rate: 1.0,
            volume: 1.0,
            ..Default::default()
        }
    }

    fn pending() -> Self {
        Self {
            rate: 1.0,
            volume: 1.0,
            ..Default::default()
        }
    }
}

impl TrackHandle for ManualTrack {
    fn duration(&self) -> Option<f64> {
        self.duration
    }
    fn position(&self) -> f64 {
        self.position
    }
    fn set_position(&mut self, secs: f64) {
        self.position = secs;
        self.seeks += 1;
    }
    fn play(&mut self) {
        self.playing = true;
    }
    fn pause(&mut self) {
        self.playing = false;
    }
    fn is_playing(&self) -> bool {
        self.playing
    }
    fn rate(&self) -> f64 {
        self.rate
    }
    fn set_rate(&mut self, rate: f64) {
        self.rate = rate;
    }
    fn volume(&self) -> f32 {
        self.volume
    }
    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }
}

const NAMES: [&str; 3] = ["vocals", "bass", "drums"];

fn player_with(durations: [f64; 3]) -> MultiTrackPlayer<ManualTrack> {
    let mut player = MultiTrackPlayer::new();
    for (name, d) in NAMES.iter().zip(durations) {
        player.add_track(*name, ManualTrack::with_duration(d));
    }
    player
}

fn set_positions(player: &mut MultiTrackPlayer<ManualTrack>, positions: [f64; 3]) {
    for (name, p) in NAMES.iter().zip(positions) {
        player.track_mut(name).unwrap().position = p;
    }
}

fn positions(player: &MultiTrackPlayer<ManualTrack>) -> Vec<f64> {
    NAMES
        .iter()
        .map(|n| player.track(n).unwrap().position)
        .collect()
}

#[test]
fn duration_is_the_shortest_track() {
    let player = player_with([10.0, 9.5, 10.2]);
    assert_eq!(player.duration(), Some(9.5));
    assert_eq!(player.check_ready().unwrap(), 9.5);
}

#[test]
fn duration_unknown_while_a_track_is_loading() {
    let mut player = player_with([10.0, 9.5, 10.2]);
    player.add_track("other", ManualTrack::pending());
    assert_eq!(player.duration(), None);
    assert_eq!(player.track_state("other"), Some(TrackState::Loading));
    assert!(player.play().is_err());
}

#[test]
fn empty_session_cannot_play() {
    let mut player: MultiTrackPlayer<ManualTrack> = MultiTrackPlayer::new();
    assert_eq!(player.duration(), None);
    assert!(matches!(player.play(), Err(SplitterError::InvalidInput(_))));
    assert_eq!(player.tick(), TickOutcome::Idle);
}

#[test]
fn seek_is_clamped_to_the_session() {
    let mut player = player_with([10.0, 9.5, 10.2]);
    assert_eq!(player.seek(9.8).unwrap(), 9.5);
    assert_eq!(positions(&player), vec![9.5, 9.5, 9.5]);

    assert_eq!(player.seek(-1.0).unwrap(), 0.0);
    assert_eq!(player.seek(f64::NAN).unwrap(), 0.0);
    assert_eq!(player.seek(4.25).unwrap(), 4.25);
    assert_eq!(positions(&player), vec![4.25, 4.25, 4.25]);
}

#[test]
fn play_starts_every_track_at_the_loop_start() {
    let mut player = player_with([10.0, 9.5, 10.2]);
    player.set_loop_start(2.0 / 9.5);
    set_positions(&mut player, [7.0, 1.0, 3.0]);

    player.play().unwrap();
    assert!(player.is_playing());
    for p in positions(&player) {
        assert_relative_eq!(p, 2.0, epsilon = 1e-9);
    }
    assert!(NAMES.iter().all(|n| player.track(n).unwrap().playing));
}

#[test]
fn pause_stops_every_track() {
    let mut player = player_with([10.0, 9.5, 10.2]);
    player.play().unwrap();
    player.pause();
    assert!(!player.is_playing());
    assert!(NAMES.iter().all(|n| !player.track(n).unwrap().playing));
    assert_eq!(player.tick(), TickOutcome::Idle);
}

#[test]
fn tick_publishes_the_slowest_position_without_snapping() {
    let mut player = player_with([10.0, 9.5, 10.2]);
    player.set_loop_start(2.0 / 9.5);
    player.set_loop_end(5.0 / 9.5);
    player.play().unwrap();

    set_positions(&mut player, [5.01, 5.02, 4.99]);
    match player.tick() {
        TickOutcome::Synced { position } => assert_relative_eq!(position, 4.99),
        other => panic!("expected synced, got {other:?}"),
    }
    assert_eq!(positions(&player), vec![5.01, 5.02, 4.99]);
    assert_relative_eq!(player.position(), 4.99);
}

#[test]
fn tick_loops_once_the_slowest_track_reaches_the_end() {
    let mut player = player_with([10.0, 9.5, 10.2]);
    player.set_loop_start(2.0 / 9.5);
    player.set_loop_end(5.0 / 9.5);
    player.play().unwrap();

    set_positions(&mut player, [5.0, 5.0, 5.0]);
    match player.tick() {
        TickOutcome::Looped { position } => assert_relative_eq!(position, 2.0, epsilon = 1e-9),
        other => panic!("expected loop, got {other:?}"),
    }
    for p in positions(&player) {
        assert_relative_eq!(p, 2.0, epsilon = 1e-9);
    }
    assert!(NAMES.iter().all(|n| player.track(n).unwrap().playing));
}

#[test]
fn tick_is_idle_unless_every_track_plays() {
    let mut player = player_with([10.0, 9.5, 10.2]);
    player.play().unwrap();
    player.track_mut("bass").unwrap().playing = false;
    set_positions(&mut player, [9.5, 9.5, 9.5]);
    assert_eq!(player.tick(), TickOutcome::Idle);
    assert_eq!(positions(&player), vec![9.5, 9.5, 9.5]);
    assert!(player.is_playing());
}

#[test]
fn session_stops_once_every_track_has_ended() {
    let mut player = player_with([10.0, 9.5, 10.2]);
    player.play().unwrap();
    assert!(player.transport().playing);

    // Each track ran off its own end.
    set_positions(&mut player, [10.0, 9.5, 10.2]);
    for name in NAMES {
        player.track_mut(name).unwrap().playing = false;
    }

    assert_eq!(player.tick(), TickOutcome::Idle);
    assert!(!player.is_playing());
    assert!(!player.transport().playing);

    player.play().unwrap();
    assert!(player.is_playing());
    assert_eq!(positions(&player), vec![0.0, 0.0, 0.0]);
}

#[test]
fn rate_is_shared_and_clamped() {
    let mut player = player_with([10.0, 9.5, 10.2]);
    assert_eq!(player.set_rate(0.5), 0.5);
    assert!(NAMES.iter().all(|n| player.track(n).unwrap().rate == 0.5));

    assert_eq!(player.set_rate(0.1), MIN_RATE);
    assert_eq!(player.set_rate(2.0), MAX_RATE);
    assert_eq!(player.set_rate(f64::NAN), MAX_RATE);
}

#[test]
fn tick_reapplies_a_drifted_rate() {
    let mut player = player_with([10.0, 9.5, 10.2]);
    player.set_rate(0.5);
    player.play().unwrap();
    player.track_mut("drums").unwrap().rate = 1.0;

    player.tick();
    assert!(NAMES.iter().all(|n| player.track(n).unwrap().rate == 0.5));
}

#[test]
fn tracks_added_later_follow_the_session_rate() {
    let mut player = player_with([10.0, 9.5, 10.2]);
    player.set_rate(0.75);
    player.add_track("other", ManualTrack::with_duration(11.0));
    assert_eq!(player.track("other").unwrap().rate, 0.75);
}

#[test]
fn volume_is_per_track() {
    let mut player = player_with([10.0, 9.5, 10.2]);
    player.play().unwrap();
    let before = positions(&player);

    assert_eq!(player.set_volume("bass", 0.3).unwrap(), 0.3);
    assert_eq!(player.set_volume("drums", 1.7).unwrap(), 1.0);
    assert_eq!(player.track("bass").unwrap().volume, 0.3);
    assert_eq!(player.track("vocals").unwrap().volume, 1.0);
    assert_eq!(positions(&player), before);
    assert!(player.is_playing());

    assert!(matches!(
        player.set_volume("piano", 0.5),
        Err(SplitterError::InvalidInput(_))
    ));
}

#[test]
fn loop_markers_cannot_cross() {
    let mut player = player_with([10.0, 9.5, 10.2]);
    player.set_loop_end(0.4);
    assert_eq!(player.set_loop_start(0.6), 0.4);
    assert_eq!(player.set_loop_end(0.1), 0.4);
    assert_eq!(player.set_loop_start(-3.0), 0.0);
    assert_eq!(player.set_loop_end(7.0), 1.0);
}

#[test]
fn moving_loop_start_relocates_and_keeps_playing() {
    let mut player = player_with([10.0, 9.5, 10.2]);
    player.play().unwrap();
    set_positions(&mut player, [6.0, 6.0, 6.0]);

    player.set_loop_start(0.5);
    for p in positions(&player) {
        assert_relative_eq!(p, 4.75, epsilon = 1e-9);
    }
    assert!(player.is_playing());
    assert!(NAMES.iter().all(|n| player.track(n).unwrap().playing));
}

#[test]
fn moving_loop_end_never_seeks() {
    let mut player = player_with([10.0, 9.5, 10.2]);
    player.play().unwrap();
    let seeks: Vec<usize> = NAMES
        .iter()
        .map(|n| player.track(n).unwrap().seeks)
        .collect();

    player.set_loop_end(0.8);
    let after: Vec<usize> = NAMES
        .iter()
        .map(|n| player.track(n).unwrap().seeks)
        .collect();
    assert_eq!(seeks, after);
}

#[test]
fn transport_reports_loop_in_seconds() {
    let mut player = player_with([10.0, 9.5, 10.2]);
    player.set_loop_start(2.0 / 9.5);
    player.set_loop_end(5.0 / 9.5);
    player.seek(65.0).unwrap();

    let t = player.transport();
    assert_relative_eq!(t.loop_start, 2.0, epsilon = 1e-9);
    assert_relative_eq!(t.loop_end, 5.0, epsilon = 1e-9);
    assert_eq!(t.duration, Some(9.5));
    assert_eq!(t.time_label(), "0:09 / 0:09");
}

#[test]
fn failed_track_blocks_play_until_removed() {
    let mut player = player_with([10.0, 9.5, 10.2]);
    player.add_failed("other", "corrupt mp3");

    assert_eq!(player.duration(), None);
    match player.play() {
        Err(SplitterError::TrackLoad { track, reason }) => {
            assert_eq!(track, "other");
            assert_eq!(reason, "corrupt mp3");
        }
        other => panic!("expected track load error, got {other:?}"),
    }
    assert!(!player.is_playing());

    assert!(player.remove_track("other").is_none());
    player.play().unwrap();
    assert!(player.is_playing());
}

#[test]
fn marking_a_track_failed_pauses_it() {
    let mut player = player_with([10.0, 9.5, 10.2]);
    player.play().unwrap();
    player.mark_failed("drums", "decoder error");

    assert!(matches!(
        player.track_state("drums"),
        Some(TrackState::Failed { .. })
    ));
    assert!(player.track("drums").is_none());
    assert_eq!(player.tick(), TickOutcome::Idle);
    assert!(player.seek(1.0).is_err());

    let removed = player.remove_track("drums");
    assert!(removed.is_none());
    assert_eq!(player.duration(), Some(9.5));
}
