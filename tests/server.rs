//! End-to-end tests against a live listener on an ephemeral port, with this
//! directory as the document root.

use std::io::{Read, Write};
use std::net::TcpStream;
use thirteen::{Config, ServerHandle};

fn start_server() -> ServerHandle {
    let config = Config {
        listen: "127.0.0.1:0".to_string(),
        root: "tests".into(),
        max_connections: 8,
        ..Config::default()
    };
    thirteen::start(config).unwrap()
}

fn fetch(handle: &ServerHandle, request: &str) -> Vec<u8> {
    let mut stream = TcpStream::connect(handle.address()).unwrap();
    stream.write_all(request.as_bytes()).unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).unwrap();
    response
}

#[test]
fn serves_a_static_file_verbatim() {
    let handle = start_server();
    let response = fetch(&handle, "/text.txt\r\n");
    assert_eq!(response, std::fs::read("tests/text.txt").unwrap());
    handle.stop();
}

#[test]
fn streams_cgi_stdout_verbatim() {
    let handle = start_server();
    let response = fetch(&handle, "/lines.cgi\r\n");
    assert_eq!(response.len(), 30);
    assert_eq!(response, b"aaaaaaaaa\nbbbbbbbbb\nccccccccc\n".to_vec());
    handle.stop();
}

#[test]
fn passes_arguments_and_environment_to_scripts() {
    let handle = start_server();
    let response = fetch(&handle, "/env.cgi/extra/path?q=1\tneedle\r\n");
    let text = String::from_utf8(response).unwrap();
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(
        lines[0],
        "argv|needle|q=1|/extra/path|/env.cgi/extra/path?q=1"
    );
    assert_eq!(lines[1], "env|/extra/path|q=1|needle|/env.cgi/extra/path");
    assert_eq!(lines[2], "alias|needle|/env.cgi/extra/path?q=1");
    handle.stop();
}

#[test]
fn resolves_a_directory_through_its_index_script() {
    let handle = start_server();
    let response = fetch(&handle, "/foo/bar/path/info\r\n");
    let text = String::from_utf8(response).unwrap();
    assert!(text.starts_with("0menu for /path/info\t/foo/bar/path/info\t"));
    handle.stop();
}

#[test]
fn renders_unservable_selectors_as_error_menus() {
    let handle = start_server();
    let port = handle.address().port();
    let response = fetch(&handle, "/text.txt/extra\r\n");
    let expected = format!("3File not found.\t\tlocalhost\t{port}\r\n.\r\n");
    assert_eq!(response, expected.into_bytes());
    handle.stop();
}

#[test]
fn scripts_observe_the_request_counters() {
    let handle = start_server();
    let _warmup = fetch(&handle, "/text.txt\r\n");

    let response = fetch(&handle, "/env.cgi\r\n");
    let text = String::from_utf8(response).unwrap();
    let counters = text
        .lines()
        .find_map(|line| line.strip_prefix("counters|"))
        .unwrap();
    assert!(counters.parse::<u64>().unwrap() >= 1);
    handle.stop();
}
