//! End-to-end tests: a real server stack on loopback sockets, driven by a
//! minimal client mirror of the wire protocol.


use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use nexus_auth::srp;
use nexus_protocol::packets::{
    ClientHelloAuth, ClientHelloWorld, ClientRealmSession, ServerAuthAccept, ServerHelloWorld,
    ServerRealmInfo,
};
use nexus_protocol::{FrameDecoder, FrameEncoder, Message, PacketFrame, SessionCipher};
use nexus_storage::{AccountRecord, CharacterSnapshot};

use crate::network::world_key_proof;
use crate::server::{start, ServerConfig, ServerHandles};

const BUILD: u32 = 16042;
const PASSWORD: &str = "piglet-and-stemdragon";
const SALT: [u8; 16] = [0x11; 16];
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) async fn start_test_server() -> ServerHandles {
    let loopback: SocketAddr = "127.0.0.1:0".parse().unwrap();
    start(ServerConfig {
        auth_addr: loopback,
        realm_addr: loopback,
        world_addr: loopback,
        public_world_address: "127.0.0.1:24000".into(),
        realm_id: 1,
        realm_name: "Test Realm".into(),
        data_dir: std::env::temp_dir().join("nexus-missing-content"),
        db_url: None,
        pool_size: 4,
        required_build: BUILD,
        session_ttl_ms: 60_000,
        secret_key_base: Some("integration-secret".into()),
    })
    .await
    .expect("server starts")
}

pub(crate) fn seed_account(handles: &ServerHandles, account_id: u64, email: &str) {
    handles.persistence.seed_account(AccountRecord {
        account_id,
        email: email.into(),
        salt: SALT.to_vec(),
        verifier: srp::verifier_for(email, PASSWORD, &SALT),
        suspended: false,
    });
}

pub(crate) fn seed_character(handles: &ServerHandles, account_id: u64, character_id: u64, name: &str) {
    handles.persistence.seed_character(CharacterSnapshot {
        character_id,
        account_id,
        name: name.into(),
        level: 1,
        xp: 0,
        faction: nexus_game::PlayerFaction::Exile,
        zone_id: 426,
        position: [0.0, 0.0, 0.0],
        rotation: 0.0,
        health: 100,
        max_health: 100,
        inventory: nexus_game::inventory::Inventory::new(16),
    });
}

/// A bare-bones client: framing, the session cipher, and typed send/recv.
pub(crate) struct TestClient {
    stream: TcpStream,
    enc: FrameEncoder,
    dec: FrameDecoder,
}

impl TestClient {
    pub(crate) async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        stream.set_nodelay(true).unwrap();
        Self {
            stream,
            enc: FrameEncoder::new(),
            dec: FrameDecoder::new(),
        }
    }

    pub(crate) async fn send<M: Message>(&mut self, msg: &M) {
        self.enc.append_message(msg).unwrap();
        let bytes = self.enc.take();
        self.stream.write_all(&bytes).await.unwrap();
    }

    pub(crate) async fn send_raw(&mut self, opcode: u16, payload: &[u8]) {
        self.enc.append_raw(opcode, payload).unwrap();
        let bytes = self.enc.take();
        self.stream.write_all(&bytes).await.unwrap();
    }

    pub(crate) async fn recv_frame(&mut self) -> PacketFrame {
        tokio::time::timeout(RECV_TIMEOUT, async {
            let mut buf = [0u8; 4096];
            loop {
                if let Some(frame) = self.dec.try_next_frame().unwrap() {
                    return frame;
                }
                let n = self.stream.read(&mut buf).await.expect("socket read");
                assert_ne!(n, 0, "server closed the connection");
                self.dec.queue_bytes(&buf[..n]);
            }
        })
        .await
        .expect("frame within the timeout")
    }

    /// Receives frames until one carries `M`'s opcode, decoding it. Other
    /// traffic (spawns, health updates) is skipped.
    pub(crate) async fn recv<M: Message>(&mut self) -> M {
        loop {
            let frame = self.recv_frame().await;
            if frame.opcode == M::OPCODE.to_u16() {
                return frame.decode().unwrap();
            }
        }
    }

    pub(crate) fn enable_encryption(&mut self, session_key: &[u8; 16]) {
        self.enc.enable_encryption(SessionCipher::new(session_key));
        self.dec.enable_encryption(SessionCipher::new(session_key));
    }
}

/// Runs auth + realm, returning the realm info (with the session key).
pub(crate) async fn login(handles: &ServerHandles, email: &str) -> ServerRealmInfo {
    let proof = srp::client::prove(email, PASSWORD, &SALT, &[7u8; 32]);

    let mut auth = TestClient::connect(handles.auth_addr).await;
    auth.send(&ClientHelloAuth {
        build: BUILD,
        email: email.into(),
        a_pub: proof.a_pub.clone(),
        m1: proof.m1,
    })
    .await;
    let accept: ServerAuthAccept = auth.recv().await;
    assert_eq!(
        accept.m2,
        srp::client::expect_m2(&proof.a_pub, &proof.m1, email, PASSWORD, &SALT)
    );

    let mut realm = TestClient::connect(handles.realm_addr).await;
    realm
        .send(&ClientRealmSession {
            session_token: accept.session_token,
        })
        .await;
    realm.recv().await
}

/// Full hop to an encrypted world connection.
pub(crate) async fn connect_world(handles: &ServerHandles, email: &str) -> (TestClient, u64) {
    let info = login(handles, email).await;

    let mut world = TestClient::connect(handles.world_addr).await;
    world
        .send(&ClientHelloWorld {
            account_id: info.account_id,
            key_proof: world_key_proof(&info.session_key, info.account_id),
        })
        .await;
    let hello: ServerHelloWorld = world.recv().await;
    assert!(hello.ok, "world handshake accepted");
    world.enable_encryption(&info.session_key);

    (world, info.account_id)
}
