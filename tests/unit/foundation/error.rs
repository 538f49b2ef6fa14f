use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        PlayerError::fetch("x")
            .to_string()
            .contains("fetch error:")
    );
    assert!(
        PlayerError::container("x")
            .to_string()
            .contains("container error:")
    );
    assert!(
        PlayerError::decoder("x")
            .to_string()
            .contains("decoder error:")
    );
    assert!(
        PlayerError::render("x")
            .to_string()
            .contains("render error:")
    );
    assert!(
        PlayerError::state("x")
            .to_string()
            .contains("invalid state:")
    );
    assert!(
        PlayerError::config("x")
            .to_string()
            .contains("config error:")
    );
}

#[test]
fn timeout_reports_duration() {
    let err = PlayerError::Timeout(Duration::from_millis(1500));
    assert!(err.to_string().contains("1.5s"));
}

#[test]
fn fetch_failures_are_classified() {
    assert!(PlayerError::Aborted.is_fetch_failure());
    assert!(PlayerError::Timeout(Duration::from_secs(1)).is_fetch_failure());
    assert!(PlayerError::fetch("404").is_fetch_failure());
    assert!(!PlayerError::container("bad box").is_fetch_failure());
    assert!(!PlayerError::decoder("boom").is_fetch_failure());
}
