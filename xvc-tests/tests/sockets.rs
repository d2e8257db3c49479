use std::io::ErrorKind;
use std::net::TcpListener;
use std::os::fd::AsRawFd;
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::socket::{self, Shutdown as SocketShutdown};
use xvc_protocol::XvcInfo;
use xvc_server::{Shutdown, server::Builder};
use xvc_server_gpio::{backends::loopback::LoopbackLines, engine::BitBang};
use xvc_tests::{Client, TestServer};

#[test]
fn urgent_data_closes_only_its_connection() {
    let server = TestServer::spawn(BitBang::new(LoopbackLines::new(), 0));
    let mut bystander = server.connect();
    assert_eq!(bystander.get_info(), XvcInfo::default());

    let mut offender = server.connect();
    assert_eq!(offender.get_info(), XvcInfo::default());
    offender.send_urgent(b'!');
    assert!(offender.drain_until_closed().is_empty());

    assert_eq!(bystander.shift(8, &[0], &[0x3C]), [0x3C]);
    let mut newcomer = server.connect();
    assert_eq!(newcomer.get_info(), XvcInfo::default());
}

#[test]
fn failed_listener_stops_accepting_and_serving_ends_with_last_client() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = listener.try_clone().unwrap();
    let shutdown = Shutdown::new();
    let flag = shutdown.clone();
    let server = thread::spawn(move || {
        let mut server = Builder::new()
            .poll_interval(Duration::from_millis(50))
            .build(BitBang::new(LoopbackLines::new(), 0));
        server.serve(listener, &flag)
    });

    let mut client = Client::connect(addr);
    assert_eq!(client.get_info(), XvcInfo::default());
    socket::shutdown(handle.as_raw_fd(), SocketShutdown::Read).unwrap();
    thread::sleep(Duration::from_millis(200));

    // The accepted connection outlives the listener
    assert_eq!(client.set_tck(25), 25u32.to_le_bytes());
    assert!(!server.is_finished());
    drop(client);

    let deadline = Instant::now() + Duration::from_secs(2);
    while !server.is_finished() {
        if Instant::now() >= deadline {
            shutdown.request();
            panic!("server kept running without listener and clients");
        }
        thread::sleep(Duration::from_millis(10));
    }
    assert!(server.join().unwrap().is_ok());
    assert!(!shutdown.is_requested());
}

#[test]
fn bind_failure_is_returned_to_caller() {
    let taken = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut server = Builder::new().build(BitBang::new(LoopbackLines::new(), 0));
    let err = server
        .listen(taken.local_addr().unwrap(), &Shutdown::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AddrInUse);
}
