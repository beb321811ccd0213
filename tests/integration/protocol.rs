use citadel_core::config::CitadelConfig;
use citadel_core::context::ServerContext;
use citadel_core::protocol::commands::InstantMessageQueues;
use citadel_core::server::{spawn_tcp_acceptor, WorkerPool};
use std::io::{BufRead, BufReader, Write};
use std::net::{IpAddr, TcpStream};
use std::sync::Arc;

fn start_server() -> std::net::SocketAddr {
    let ctx = Arc::new(ServerContext::new_in_memory(CitadelConfig::default()));
    ctx.create_user("bob", "buildsitwell");
    let im_queues = Arc::new(InstantMessageQueues::default());
    let pool = Arc::new(WorkerPool::start(2, ctx, im_queues));
    let addr = (IpAddr::from([127, 0, 0, 1]), 0);
    // bind on an ephemeral port by letting the OS choose, then read it back
    let listener = std::net::TcpListener::bind(addr).unwrap();
    let bound = listener.local_addr().unwrap();
    drop(listener);
    let handle = spawn_tcp_acceptor((bound.ip(), bound.port()), pool).unwrap();
    std::mem::forget(handle);
    bound
}

struct LineClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl LineClient {
    fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        LineClient { reader, writer: stream }
    }

    fn read_line(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap();
        line.trim_end().to_string()
    }

    fn send(&mut self, line: &str) -> String {
        self.writer.write_all(line.as_bytes()).unwrap();
        self.writer.write_all(b"\r\n").unwrap();
        self.read_line()
    }
}

#[test]
fn login_goto_post_and_list_over_the_wire() {
    let addr = start_server();
    let mut c = LineClient::connect(addr);
    let greeting = c.read_line();
    assert!(greeting.starts_with("200"));

    assert!(c.send("USER bob").starts_with("3"));
    assert!(c.send("PASS buildsitwell").starts_with("2"));
    assert!(c.send("GOTO Lobby").starts_with("2"));

    assert!(c.send("ENT0 1|0|0|hello from the wire|").starts_with("8"));
    c.writer.write_all(b"Posted over the line protocol\r\n000\r\n").unwrap();

    let msgs = c.send("MSGS ALL");
    assert!(msgs.starts_with("100"));

    // drain the listing until the terminator
    loop {
        let line = c.read_line();
        if line == "000" {
            break;
        }
    }

    c.send("QUIT");
}
