use std::{
    cell::RefCell,
    fs,
    path::{Path, PathBuf},
};
use tempfile::tempdir;

use track_splitter_core::{
    Library, Result, SongFetcher, SongSource, SplitterError,
};

#[test]
fn lists_visible_files_sorted() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("b-side.mp3"), b"b").unwrap();
    fs::write(dir.path().join("a-side.wav"), b"a").unwrap();
    fs::write(dir.path().join(".DS_Store"), b"x").unwrap();
    fs::create_dir(dir.path().join("covers")).unwrap();

    let songs = Library::new(dir.path()).list_songs().unwrap();
    let names: Vec<&str> = songs.iter().map(|s| s.file_name.as_str()).collect();
    assert_eq!(names, vec!["a-side.wav", "b-side.mp3"]);
    assert_eq!(songs[0].id, "a-side");
    assert!(songs.iter().all(|s| s.source == SongSource::Preloaded));
}

#[test]
fn missing_input_dir_is_an_empty_library() {
    let dir = tempdir().unwrap();
    let songs = Library::new(dir.path().join("nope")).list_songs().unwrap();
    assert!(songs.is_empty());
}

#[test]
fn upload_keeps_an_existing_file() {
    let dir = tempdir().unwrap();
    let library = Library::new(dir.path().join("inputs"));

    let first = library.save_upload("demo.mp3", b"first").unwrap();
    assert_eq!(first.source, SongSource::Uploaded);
    assert_eq!(first.id, "demo");

    let second = library.save_upload("demo.mp3", b"second").unwrap();
    assert_eq!(second.path, first.path);
    assert_eq!(fs::read(&first.path).unwrap(), b"first");

    assert_eq!(library.list_songs().unwrap().len(), 1);
}

#[test]
fn upload_names_cannot_escape_the_input_dir() {
    let dir = tempdir().unwrap();
    let library = Library::new(dir.path().join("inputs"));
    let song = library.save_upload("../../evil.mp3", b"x").unwrap();
    assert_eq!(song.path, dir.path().join("inputs").join("evil.mp3"));
    assert!(matches!(
        library.save_upload("..", b"x"),
        Err(SplitterError::InvalidInput(_))
    ));
}

#[test]
fn unknown_song_is_invalid_input() {
    let dir = tempdir().unwrap();
    let err = Library::new(dir.path()).song("ghost.mp3").unwrap_err();
    assert!(matches!(err, SplitterError::InvalidInput(_)));
}

struct RecordingFetcher {
    urls: RefCell<Vec<String>>,
}

impl SongFetcher for RecordingFetcher {
    fn fetch(&self, url: &str, input_dir: &Path) -> Result<PathBuf> {
        self.urls.borrow_mut().push(url.to_string());
        let path = input_dir.join("Some Title.mp3");
        fs::write(&path, b"fetched")?;
        Ok(path)
    }
}

#[test]
fn fetch_normalizes_short_links_and_records_the_song() {
    let dir = tempdir().unwrap();
    let library = Library::new(dir.path().join("inputs"));
    let fetcher = RecordingFetcher {
        urls: RefCell::new(Vec::new()),
    };

    let song = library
        .fetch(&fetcher, "https://youtu.be/GLvohMXgcBo?si=abc")
        .unwrap();
    assert_eq!(
        fetcher.urls.borrow().as_slice(),
        &["https://www.youtube.com/watch?v=GLvohMXgcBo".to_string()]
    );
    assert_eq!(song.source, SongSource::Downloaded);
    assert_eq!(song.id, "Some Title");
    assert_eq!(library.song("Some Title.mp3").unwrap().path, song.path);
}

#[cfg(unix)]
#[test]
fn command_fetcher_reports_downloader_failure() {
    use track_splitter_core::CommandFetcher;

    let dir = tempdir().unwrap();
    let library = Library::new(dir.path().join("inputs"));
    let err = library
        .fetch(&CommandFetcher::new("false"), "https://example.com/track")
        .unwrap_err();
    assert!(matches!(err, SplitterError::Fetch(_)));
}
