use super::*;

#[test]
fn from_arg_splits_urls_and_paths() {
    assert_eq!(
        VideoSource::from_arg("https://cdn.test/v.mp4"),
        VideoSource::Url("https://cdn.test/v.mp4".to_string())
    );
    assert_eq!(
        VideoSource::from_arg("HTTP://cdn.test/v.mp4"),
        VideoSource::Url("HTTP://cdn.test/v.mp4".to_string())
    );
    assert_eq!(
        VideoSource::from_arg("clips/a.webm"),
        VideoSource::Path(PathBuf::from("clips/a.webm"))
    );
    assert_eq!(
        VideoSource::from_arg("file:///tmp/a.mp4"),
        VideoSource::Path(PathBuf::from("/tmp/a.mp4"))
    );
}

#[test]
fn locator_arg_is_lossless_for_utf8() {
    assert_eq!(
        MediaLocator::Path(PathBuf::from("/tmp/clip.mp4")).as_arg(),
        "/tmp/clip.mp4"
    );
    assert_eq!(
        MediaLocator::Url("https://x.test/v".to_string()).as_arg(),
        "https://x.test/v"
    );
}
