use approx::assert_relative_eq;
use std::{fs, thread, time::Duration};
use tempfile::tempdir;

use track_splitter_core::{
    decode_bytes, load_stems, read_audio, write_audio, ArtifactLayout, AudioData, BufferTrack,
    ModelSpec, StemCatalog, StemLookup, TrackHandle,
};

fn tone(seconds: f64, sample_rate: u32, channels: u16) -> AudioData {
    let frames = (seconds * sample_rate as f64) as usize;
    let mut samples = Vec::with_capacity(frames * channels as usize);
    for i in 0..frames {
        let s = (i as f32 * 440.0 * std::f32::consts::TAU / sample_rate as f32).sin() * 0.5;
        for _ in 0..channels {
            samples.push(s);
        }
    }
    AudioData {
        samples,
        sample_rate,
        channels,
    }
}

#[test]
fn wav_round_trip_keeps_length() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    write_audio(&path, &tone(0.5, 8000, 2)).unwrap();

    let audio = read_audio(&path).unwrap();
    assert_eq!(audio.sample_rate, 8000);
    assert_eq!(audio.channels, 2);
    assert_relative_eq!(audio.duration_secs(), 0.5, epsilon = 1e-3);
}

#[test]
fn in_memory_bytes_decode_to_a_track() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    write_audio(&path, &tone(1.25, 8000, 1)).unwrap();

    let audio = decode_bytes(fs::read(&path).unwrap(), Some("wav")).unwrap();
    let mut track = BufferTrack::new(audio);
    assert_relative_eq!(track.duration().unwrap(), 1.25, epsilon = 1e-3);

    track.set_position(10.0);
    assert_relative_eq!(track.position(), track.duration().unwrap());
    assert!(!track.is_playing());

    track.set_position(0.2);
    assert_eq!(track.current_frame(), 1600);
}

#[test]
fn playing_track_advances_at_its_rate() {
    let mut track = BufferTrack::new(tone(5.0, 8000, 1));
    track.set_rate(0.5);
    track.play();
    thread::sleep(Duration::from_millis(200));
    track.pause();

    let pos = track.position();
    assert!(pos > 0.05 && pos < 0.5, "position {pos}");
    assert!(!track.is_playing());

    thread::sleep(Duration::from_millis(50));
    assert_eq!(track.position(), pos);
}

#[test]
fn garbage_bytes_do_not_decode() {
    assert!(decode_bytes(b"not audio at all".to_vec(), Some("mp3")).is_err());
}

#[test]
fn undecodable_stem_becomes_a_failed_track() {
    let dir = tempdir().unwrap();
    let layout = ArtifactLayout::new(dir.path());
    let model = ModelSpec::new("duo", &["vocals", "bass"]);

    let wav = dir.path().join("tone.wav");
    write_audio(&wav, &tone(0.5, 8000, 1)).unwrap();
    let vocals = layout.stem_path("demo", "vocals", "duo");
    fs::create_dir_all(vocals.parent().unwrap()).unwrap();
    fs::copy(&wav, &vocals).unwrap();
    fs::write(layout.stem_path("demo", "bass", "duo"), b"broken").unwrap();

    let StemLookup::Ready(set) = StemCatalog::new(layout).resolve("demo", &model).unwrap() else {
        panic!("both stems are on disk");
    };
    let mut player = load_stems(&set);

    let err = player.play().unwrap_err();
    assert!(err.to_string().contains("bass"), "{err}");

    player.remove_track("bass");
    player.play().unwrap();
    assert!(player.is_playing());
}
