//! Greeter Example: two nodes calling each other over one in-process pipe.
//!
//! This example wires a client node and a server node together with
//! `tokio::io::duplex` and demonstrates:
//!
//! - `rpc_schemas!` / `rpc_service!` for declaring messages and methods
//! - Typed handlers registered on the builder
//! - The generated typed stub, and the generic [`Stub::call`] it wraps
//! - Stub calls resolving out of order, correlated by key
//! - Error replies travelling back as values
//! - The same connection carrying calls in both directions
//!
//! [`Stub::call`]: switchboard::Stub::call
//!
//! # Run
//!
//! ```bash
//! cargo run --example greeter
//! ```

use std::time::Duration;

use switchboard::{
    CallError, ConnectionConfig, ConnectionEvent, Direction, JsonCodec, NodeBuilder, PeerId,
    RpcNode, TokioProviders,
};

// ============================================================================
// Message Types
// ============================================================================

switchboard::rpc_schemas! {
    /// Everything that travels between the demo nodes.
    pub enum DemoPayload {
        /// Ask for a greeting.
        pub struct GreetRequest {
            /// Who to greet.
            pub name: String,
        }

        /// The greeting.
        pub struct GreetReply {
            /// Greeting text.
            pub greeting: String,
        }

        /// Reverse-direction probe, server to client.
        pub struct PingRequest {
            /// Probe sequence number.
            pub seq: u32,
        }

        /// Probe answer.
        pub struct PingReply {
            /// Echoed sequence number.
            pub seq: u32,
        }
    }
}

// ============================================================================
// Service Definition
// ============================================================================

switchboard::rpc_service! {
    /// Greetings one way, pings the other.
    pub Greeter {
        /// Compose a greeting.
        greet: GreetRequest => GreetReply,
        /// Refuse to compose a greeting.
        judge: GreetRequest => GreetReply,
        /// Probe the calling side.
        ping: PingRequest => PingReply,
    }

    /// Typed client for [`Greeter`].
    pub stub GreeterStub;
}

type DemoNode = RpcNode<DemoPayload, JsonCodec, TokioProviders>;

// ============================================================================
// Nodes
// ============================================================================

fn build_server() -> Result<DemoNode, Box<dyn std::error::Error>> {
    let node = NodeBuilder::new(Greeter::descriptor(), JsonCodec, TokioProviders::new())
        .handle(Greeter::greet, |req: GreetRequest, _peer| async move {
            // Pretend greetings take a moment, so replies interleave.
            let work = Duration::from_millis(if req.name.len() % 2 == 0 { 30 } else { 5 });
            tokio::time::sleep(work).await;
            Ok(GreetReply {
                greeting: format!("hello, {}!", req.name),
            })
        })
        .handle(Greeter::judge, |req: GreetRequest, _peer| async move {
            Err::<GreetReply, _>(CallError::Handler {
                message: format!("'{}' does not deserve a greeting", req.name),
            })
        })
        .build()?;
    Ok(node)
}

fn build_client() -> Result<DemoNode, Box<dyn std::error::Error>> {
    let node = NodeBuilder::new(Greeter::descriptor(), JsonCodec, TokioProviders::new())
        .with_config(ConnectionConfig::default().with_call_timeout(Duration::from_secs(5)))
        .handle(Greeter::ping, |req: PingRequest, peer| async move {
            println!("  [client] ping {} from {:?}", req.seq, peer);
            Ok(PingReply { seq: req.seq })
        })
        .build()?;
    Ok(node)
}

// ============================================================================
// Demo
// ============================================================================

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Switchboard Greeter Demo ===\n");

    let server = build_server()?;
    let client = build_client()?;
    let mut client_events = client.events().expect("first take of the event receiver");

    // The host owns the transport; here it is an in-memory pipe.
    let (near, far) = tokio::io::duplex(64 * 1024);
    let server_conn = server.adopt(far, None, Direction::Incoming);
    let mut client_conn =
        client.adopt(near, Some(PeerId::new("greeter-server")), Direction::Outgoing);

    if let Some(ConnectionEvent::Opened { connection, .. }) = client_events.recv().await {
        println!("client connection {} open\n", connection);
    }

    // ========================================================================
    // Concurrent calls, replies correlated by key
    // ========================================================================
    let stub = client.stub(&client_conn);
    let greeter = GreeterStub::new(stub.clone());

    let mut futures = Vec::new();
    for name in ["ada", "grace", "edsger"] {
        let future = greeter.greet(GreetRequest {
            name: name.to_string(),
        })?;
        futures.push((name, future));
        println!("sent greet({})", name);
    }
    println!();

    for (name, future) in futures {
        let reply = future.await?;
        println!("greet({}) -> {:?}", name, reply.greeting);
    }

    // The wrapper delegates to the generic surface; hosts can use either.
    let direct: GreetReply = stub
        .call(
            Greeter::greet,
            GreetRequest {
                name: "alan".to_string(),
            },
        )?
        .await?;
    println!("greet(alan) via Stub::call -> {:?}\n", direct.greeting);

    // ========================================================================
    // An error reply is a value, not a dead connection
    // ========================================================================
    let refusal = greeter
        .judge(GreetRequest {
            name: "nobody".to_string(),
        })?
        .await;
    println!("judge(nobody) -> {:?}", refusal);

    // ========================================================================
    // The same pipe carries calls the other way
    // ========================================================================
    let server_greeter = GreeterStub::new(server.stub(&server_conn));
    let pong = server_greeter.ping(PingRequest { seq: 7 })?.await?;
    println!("server's ping(7) -> seq {}\n", pong.seq);

    // ========================================================================
    // Shutdown
    // ========================================================================
    let metrics = client_conn.metrics();
    println!(
        "client metrics: {} frames out, {} frames in, {} calls issued",
        metrics.frames_sent, metrics.frames_received, metrics.calls_issued
    );

    client_conn.close().await;
    if let Some(ConnectionEvent::Closed { reason, .. }) = client_events.recv().await {
        println!("client connection closed: {}", reason);
    }

    Ok(())
}

fn main() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()
        .expect("Failed to create Tokio runtime");
    let local = tokio::task::LocalSet::new();

    runtime.block_on(local.run_until(async {
        if let Err(e) = run().await {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    }));
}
