use core_decoder::mock::MockDecoderClient;
use core_decoder::{stream_access, AudioFormat, DecoderClient, DecoderCommand, InputStream, ReadyHandler};
use mockall::mock;
use std::io;

mock! {
    Input {}

    impl InputStream for Input {
        fn uri(&self) -> &str;
        fn is_seekable(&self) -> bool;
        fn size(&self) -> Option<u64>;
        fn offset(&self) -> u64;
        fn is_eof(&self) -> bool;
        fn is_available(&self) -> bool;
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
        fn seek(&mut self, offset: u64) -> io::Result<()>;
        fn set_ready_handler(&mut self, handler: ReadyHandler);
    }
}

fn mock_input() -> MockInput {
    let mut input = MockInput::new();
    input.expect_uri().return_const("mock://input".to_string());
    input
}

fn ready_client() -> MockDecoderClient {
    let mut client = MockDecoderClient::new();
    client.ready(AudioFormat::cd_quality(), true, None).unwrap();
    client
}

#[test]
fn test_read_retries_interrupted() {
    let mut input = mock_input();
    input.expect_is_available().return_const(true);
    let mut attempts = 0;
    input.expect_read().times(2).returning(move |buf| {
        attempts += 1;
        if attempts == 1 {
            return Err(io::Error::from(io::ErrorKind::Interrupted));
        }
        buf[..10].fill(0xAB);
        Ok(10)
    });

    let mut client = ready_client();
    let mut buf = [0u8; 64];
    assert_eq!(stream_access::read(&mut client, &mut input, &mut buf), 10);
    assert_eq!(&buf[..10], &[0xAB; 10]);
}

#[test]
fn test_read_error_reports_zero() {
    let mut input = mock_input();
    input.expect_is_available().return_const(true);
    input
        .expect_read()
        .times(1)
        .returning(|_| Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer went away")));

    let mut client = ready_client();
    let mut buf = [0u8; 64];
    assert_eq!(stream_access::read(&mut client, &mut input, &mut buf), 0);
    // no command was involved
    assert_eq!(client.command(), DecoderCommand::None);
}

#[test]
fn test_read_waits_for_availability() {
    let mut input = mock_input();
    let mut polls = 0;
    input.expect_is_available().returning(move || {
        polls += 1;
        polls > 3
    });
    input.expect_read().times(1).returning(|buf| Ok(buf.len()));

    let mut client = ready_client();
    let mut buf = [0u8; 32];
    assert_eq!(stream_access::read(&mut client, &mut input, &mut buf), 32);
}

#[test]
fn test_pending_stop_prevents_read() {
    let mut input = mock_input();
    input.expect_is_available().return_const(false);
    input.expect_read().never();

    let mut client = ready_client();
    client.set_command(DecoderCommand::Stop);
    let mut buf = [0u8; 32];
    assert_eq!(stream_access::read(&mut client, &mut input, &mut buf), 0);
}

#[test]
fn test_read_full_fails_at_end_of_stream() {
    let mut input = mock_input();
    input.expect_is_available().return_const(true);
    let mut remaining = 100usize;
    input.expect_read().returning(move |buf| {
        let n = remaining.min(buf.len()).min(40);
        remaining -= n;
        Ok(n)
    });

    let mut client = ready_client();
    let mut buf = [0u8; 128];
    assert!(!stream_access::read_full(&mut client, &mut input, &mut buf));
}

#[test]
fn test_skip_reads_in_bounded_pieces() {
    let mut input = mock_input();
    input.expect_is_available().return_const(true);
    input.expect_read().times(3).returning(|buf| {
        assert!(buf.len() <= 1024);
        Ok(buf.len())
    });

    let mut client = ready_client();
    assert!(stream_access::skip(&mut client, &mut input, 3000));
}
