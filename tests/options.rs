//! Socket option accessors and `SocketConfig` application

mod common;

use std::sync::Arc;

use common::FakeProvider;
use rsocket::net::opt::{self, SOL_RDMA};
use rsocket::net::{Connector, Descriptor, Error, Provider, SockAddr, SockOpt, SocketConfig};

fn peer() -> SockAddr {
    SockAddr::new_v4([10, 0, 0, 1].into(), 7471)
}

fn connector(fake: &Arc<FakeProvider>) -> Connector {
    let provider: Arc<dyn Provider> = fake.clone();
    Connector::with_provider(provider)
}

fn int_bytes(value: i32) -> Option<Vec<u8>> {
    Some(value.to_ne_bytes().to_vec())
}

#[test]
fn test_rdma_options_use_rdma_level() {
    let fake = FakeProvider::new();
    let conn = connector(&fake).connect(&peer()).unwrap();
    let fd = conn.descriptor().unwrap().raw();
    let sock = conn.socket().unwrap();

    sock.set_rdma_sq_size(256).unwrap();
    sock.set_rdma_rq_size(128).unwrap();
    sock.set_rdma_inline(64).unwrap();

    assert_eq!(fake.option(fd, SOL_RDMA, opt::RDMA_SQSIZE), int_bytes(256));
    assert_eq!(fake.option(fd, SOL_RDMA, opt::RDMA_RQSIZE), int_bytes(128));
    assert_eq!(fake.option(fd, SOL_RDMA, opt::RDMA_INLINE), int_bytes(64));
}

#[test]
fn test_flag_round_trip() {
    let fake = FakeProvider::new();
    let conn = connector(&fake).connect(&peer()).unwrap();
    let sock = conn.socket().unwrap();

    sock.set_nodelay(true).unwrap();
    assert!(sock.nodelay().unwrap());
    sock.set_reuse_addr(false).unwrap();
    assert!(!sock.reuse_addr().unwrap());

    sock.set_send_buffer(1 << 20).unwrap();
    assert_eq!(sock.send_buffer().unwrap(), 1 << 20);
}

#[test]
fn test_unset_option_reports_native_error() {
    let fake = FakeProvider::new();
    let conn = connector(&fake).connect(&peer()).unwrap();

    let err = conn.socket().unwrap().recv_buffer().unwrap_err();
    assert!(matches!(
        err,
        Error::NativeCallFailed { call: "getsockopt", code } if code == libc::ENOPROTOOPT
    ));
}

#[test]
fn test_oversized_buffer_rejected_before_provider() {
    let fake = FakeProvider::new();
    let conn = connector(&fake).connect(&peer()).unwrap();

    let err = conn.socket().unwrap().set_recv_buffer(usize::MAX).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert_eq!(fake.count("setsockopt"), 0);
}

#[test]
fn test_raw_option_bytes() {
    let fake = FakeProvider::new();
    let conn = connector(&fake).connect(&peer()).unwrap();
    let fd: Descriptor = conn.descriptor().unwrap();
    let provider: Arc<dyn Provider> = fake.clone();

    opt::set_option(provider.as_ref(), fd, SOL_RDMA, opt::RDMA_ROUTE, &[1, 2, 3, 4, 5]).unwrap();

    let mut buf = [0u8; 8];
    let n = opt::get_option(provider.as_ref(), fd, SOL_RDMA, opt::RDMA_ROUTE, &mut buf).unwrap();
    assert_eq!(&buf[..n], &[1, 2, 3, 4, 5]);

    // A two byte value is not an int.
    opt::set_option(provider.as_ref(), fd, SOL_RDMA, opt::RDMA_IOMAPSIZE, &[1, 2]).unwrap();
    let err =
        opt::get_option_int(provider.as_ref(), fd, SOL_RDMA, opt::RDMA_IOMAPSIZE).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[test]
fn test_check_socket_error() {
    let fake = FakeProvider::new();
    let conn = connector(&fake).connect(&peer()).unwrap();
    let fd = conn.descriptor().unwrap();
    let provider: Arc<dyn Provider> = fake.clone();

    opt::check_socket_error(provider.as_ref(), fd).unwrap();

    fake.set_so_error(libc::ETIMEDOUT);
    let err = opt::check_socket_error(provider.as_ref(), fd).unwrap_err();
    assert!(matches!(
        err,
        Error::NativeCallFailed { call: "SO_ERROR", code } if code == libc::ETIMEDOUT
    ));
}

#[test]
fn test_config_applied_before_connect() {
    let config: SocketConfig = toml::from_str(
        r#"
        nodelay = true
        send_buffer = 65536
        sq_size = 512
        rq_size = 512
        inline_size = 128
        "#,
    )
    .expect("Failed to parse config");

    let fake = FakeProvider::new();
    let conn = connector(&fake).config(config).connect(&peer()).unwrap();
    let fd = conn.descriptor().unwrap().raw();

    let tcp_nodelay = SockOpt::TCP_NODELAY;
    assert_eq!(fake.option(fd, tcp_nodelay.level, tcp_nodelay.name), int_bytes(1));
    assert_eq!(
        fake.option(fd, libc::SOL_SOCKET, libc::SO_SNDBUF),
        int_bytes(65536)
    );
    assert_eq!(fake.option(fd, SOL_RDMA, opt::RDMA_SQSIZE), int_bytes(512));
    assert_eq!(fake.option(fd, SOL_RDMA, opt::RDMA_RQSIZE), int_bytes(512));
    assert_eq!(fake.option(fd, SOL_RDMA, opt::RDMA_INLINE), int_bytes(128));
    assert_eq!(fake.option(fd, libc::SOL_SOCKET, libc::SO_RCVBUF), None);

    let calls = fake.calls();
    let last_option = calls.iter().rposition(|c| *c == "setsockopt").unwrap();
    let connect = calls.iter().position(|c| *c == "connect").unwrap();
    assert!(last_option < connect);
}

#[test]
fn test_config_failure_is_partial_setup() {
    let fake = FakeProvider::new();
    fake.fail("setsockopt", libc::ENOPROTOOPT);

    let err = connector(&fake)
        .config(SocketConfig::new().inline_size(64))
        .connect(&peer())
        .unwrap_err();
    assert!(matches!(err, Error::PartialSetupFailure(_)));
    assert_eq!(err.raw_os_error(), Some(libc::ENOPROTOOPT));
    assert_eq!(fake.open_descriptors(), 0);
}

#[test]
fn test_empty_config_adds_no_calls() {
    let fake = FakeProvider::new();
    let _conn = connector(&fake)
        .config(SocketConfig::default())
        .connect(&peer())
        .unwrap();
    assert_eq!(fake.count("setsockopt"), 0);
}
