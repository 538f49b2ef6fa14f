use super::*;

#[test]
fn memory_fetcher_serves_registered_urls() {
    let fetcher = MemoryFetcher::new();
    fetcher.insert("mem://clip.mp4", vec![1u8, 2, 3]);
    let token = CancelToken::new();
    let bytes = fetcher
        .fetch("mem://clip.mp4", &token, Duration::from_secs(1))
        .unwrap();
    assert_eq!(bytes, vec![1, 2, 3]);

    let err = fetcher
        .fetch("mem://missing.mp4", &token, Duration::from_secs(1))
        .unwrap_err();
    assert!(matches!(err, PlayerError::Fetch(_)));

    assert!(fetcher.remove("mem://clip.mp4"));
    assert!(!fetcher.remove("mem://clip.mp4"));
}

#[test]
fn cancelled_token_aborts() {
    let fetcher = MemoryFetcher::new();
    fetcher.insert("a", vec![0u8]);
    let token = CancelToken::new();
    token.cancel();
    assert_eq!(
        fetcher.fetch("a", &token, Duration::from_secs(1)),
        Err(PlayerError::Aborted)
    );
    assert_eq!(
        DefaultFetcher.fetch("/nonexistent", &token, Duration::from_secs(1)),
        Err(PlayerError::Aborted)
    );
}

#[test]
fn abort_handle_reaches_armed_token() {
    let handle = AbortHandle::default();
    assert!(!handle.abort());

    let token = handle.arm();
    let remote = handle.clone();
    std::thread::spawn(move || assert!(remote.abort()))
        .join()
        .unwrap();
    assert!(token.is_cancelled());

    handle.disarm();
    assert!(!handle.abort());
}

#[test]
fn reads_local_files_and_reports_missing_ones() {
    let dir = std::env::temp_dir().join(format!("reelplay-fetch-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("payload.bin");
    let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, &payload).unwrap();

    let token = CancelToken::new();
    let url = format!("file://{}", path.display());
    let bytes = DefaultFetcher
        .fetch(&url, &token, Duration::from_secs(5))
        .unwrap();
    assert_eq!(bytes, payload);

    let err = DefaultFetcher
        .fetch(
            dir.join("missing.bin").to_str().unwrap(),
            &token,
            Duration::from_secs(5),
        )
        .unwrap_err();
    assert!(err.is_fetch_failure());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn elapsed_deadline_times_out() {
    let token = CancelToken::new();
    let err = read_all(&[1u8, 2, 3][..], &token, Instant::now(), Duration::ZERO).unwrap_err();
    assert_eq!(err, PlayerError::Timeout(Duration::ZERO));
}

#[test]
fn cancel_interrupts_a_server_that_never_answers() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let server = std::thread::spawn(move || {
        let (_conn, _) = listener.accept().unwrap();
        // Hold the connection open without writing a response.
        let _ = release_rx.recv_timeout(Duration::from_secs(10));
    });

    let token = CancelToken::new();
    let remote = token.clone();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        remote.cancel();
    });

    let started = Instant::now();
    let result = DefaultFetcher.fetch(
        &format!("http://{addr}/clip.mp4"),
        &token,
        Duration::from_secs(4),
    );
    let elapsed = started.elapsed();
    assert_eq!(result, Err(PlayerError::Aborted));
    assert!(elapsed < Duration::from_secs(2), "abort took {elapsed:?}");

    drop(release_tx);
    server.join().unwrap();
}

#[test]
fn deadline_interrupts_a_server_that_never_answers() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let server = std::thread::spawn(move || {
        let (_conn, _) = listener.accept().unwrap();
        let _ = release_rx.recv_timeout(Duration::from_secs(10));
    });

    let timeout = Duration::from_millis(200);
    let started = Instant::now();
    let result = DefaultFetcher.fetch(&format!("http://{addr}/clip.mp4"), &CancelToken::new(), timeout);
    assert_eq!(result, Err(PlayerError::Timeout(timeout)));
    assert!(started.elapsed() < Duration::from_secs(2));

    drop(release_tx);
    server.join().unwrap();
}
