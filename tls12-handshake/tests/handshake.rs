//! Whole handshakes driven through the engine.
use std::sync::Arc;
use std::thread;

use ring::digest;
use tls12_handshake::internal::msgs::{CertificatePayload, CertificateRequestPayload, Codec};
use tls12_handshake::{
    CertificateStore, ClientCertificateType, Error, ErrorKind, HandshakeContext,
    HandshakeEngine, HandshakeStage, InvalidMessage, ModuleId, ModuleRegistry, ServerConfig,
    SignatureScheme, MAX_HANDSHAKE_STEPS,
};

mod common;
use crate::common::*;

use HandshakeStage::*;

fn hello_and_flight(engine: &HandshakeEngine, cx: &mut HandshakeContext) -> Vec<HandshakeStage> {
    engine
        .process_message(cx, ClientHello, &ClientHelloBuilder::new().build())
        .unwrap();
    engine.advance(cx).unwrap();
    cx.take_outgoing()
        .into_iter()
        .map(|m| m.stage)
        .collect()
}

#[test]
fn full_handshake_without_client_auth() {
    let engine = make_engine(default_builder());
    let mut cx = engine.new_context();

    assert_eq!(
        hello_and_flight(&engine, &mut cx),
        vec![ServerHello, Certificate, ServerHelloDone]
    );
    assert_eq!(cx.stage(), ClientKeyExchange);
    assert!(cx.awaiting_peer());

    engine
        .process_message(&mut cx, ClientKeyExchange, &client_key_exchange(&[0x11; 48]))
        .unwrap();
    assert_eq!(cx.stage(), ChangeCipherSpec);
    engine
        .process_message(&mut cx, ChangeCipherSpec, CCS)
        .unwrap();
    engine
        .process_message(&mut cx, Finished, FINISHED)
        .unwrap();

    assert!(cx.is_complete());
    assert_eq!(
        cx.order(),
        &[
            ClientHello,
            ServerHello,
            Certificate,
            ServerHelloDone,
            ClientKeyExchange,
            ChangeCipherSpec,
            Finished
        ]
    );
    // one step per message plus the transition
    assert_eq!(cx.steps(), 8);
    assert_eq!(cx.client_key_exchange(), Some(&[0x11; 48][..]));
    assert_eq!(cx.client_verify_data(), Some(&[0xab; 12]));
    assert_eq!(cx.server_certificate().len(), 1);
    assert!(cx.client_certificates().is_empty());
    assert!(cx.error().is_none());
}

#[test]
fn full_handshake_with_client_auth() {
    let engine = make_engine(default_builder().with_client_auth());
    let mut cx = engine.new_context();

    assert_eq!(
        hello_and_flight(&engine, &mut cx),
        vec![ServerHello, Certificate, CertificateRequest, ServerHelloDone]
    );
    assert_eq!(cx.stage(), Certificate);
    assert!(cx.awaiting_peer());

    let client = make_record("client", &["client.example.com"]);
    engine
        .process_message(&mut cx, Certificate, &client_certificate(client.chain()))
        .unwrap();
    engine
        .process_message(&mut cx, ClientKeyExchange, &client_key_exchange(&[0x22; 48]))
        .unwrap();
    assert_eq!(cx.stage(), CertificateVerify);
    engine
        .process_message(
            &mut cx,
            CertificateVerify,
            &certificate_verify(SignatureScheme::ECDSA_NISTP256_SHA256),
        )
        .unwrap();
    engine
        .process_message(&mut cx, ChangeCipherSpec, CCS)
        .unwrap();
    engine
        .process_message(&mut cx, Finished, FINISHED)
        .unwrap();

    assert!(cx.is_complete());
    assert_eq!(
        cx.order(),
        &[
            ClientHello,
            ServerHello,
            Certificate,
            CertificateRequest,
            ServerHelloDone,
            Certificate,
            ClientKeyExchange,
            CertificateVerify,
            ChangeCipherSpec,
            Finished
        ]
    );
    assert_eq!(cx.steps(), 11);
    assert!(cx.steps() <= MAX_HANDSHAKE_STEPS);
    assert_eq!(cx.client_certificates(), client.chain());
    assert_eq!(
        cx.client_verify_scheme(),
        Some(SignatureScheme::ECDSA_NISTP256_SHA256)
    );
}

#[test]
fn client_auth_with_empty_certificate_skips_verify() {
    let engine = make_engine(default_builder().with_client_auth());
    let mut cx = engine.new_context();
    hello_and_flight(&engine, &mut cx);

    engine
        .process_message(&mut cx, Certificate, &client_certificate(&[]))
        .unwrap();
    engine
        .process_message(&mut cx, ClientKeyExchange, &client_key_exchange(&[1]))
        .unwrap();
    assert_eq!(cx.stage(), ChangeCipherSpec);

    assert_eq!(
        engine.process_message(
            &mut cx,
            CertificateVerify,
            &certificate_verify(SignatureScheme::RSA_PSS_SHA256)
        ),
        Err(Error::InappropriateHandshakeMessage {
            expect_types: vec![ChangeCipherSpec],
            got_type: CertificateVerify,
        })
    );
}

#[test]
fn certificate_request_contents() {
    let engine = make_engine(default_builder().with_client_auth());
    let mut cx = engine.new_context();
    engine
        .process_message(&mut cx, ClientHello, &ClientHelloBuilder::new().build())
        .unwrap();
    engine.advance(&mut cx).unwrap();

    let out = cx.take_outgoing();
    let cr = out
        .iter()
        .find(|m| m.stage == CertificateRequest)
        .unwrap();
    let cr = CertificateRequestPayload::read_bytes(&cr.bytes[4..]).unwrap();
    assert_eq!(
        cr.certtypes,
        vec![ClientCertificateType::RSASign, ClientCertificateType::ECDSASign]
    );
    assert_eq!(
        cr.sigschemes,
        tls12_handshake::SignatureAlgorithmCatalog::DEFAULT_SCHEMES.to_vec()
    );
    assert!(cr.canames.is_empty());
}

#[test]
fn unsupported_certificate_verify_scheme() {
    let engine = make_engine(default_builder().with_client_auth());
    let mut cx = engine.new_context();
    hello_and_flight(&engine, &mut cx);

    let client = make_record("client", &["client.example.com"]);
    engine
        .process_message(&mut cx, Certificate, &client_certificate(client.chain()))
        .unwrap();
    engine
        .process_message(&mut cx, ClientKeyExchange, &client_key_exchange(&[1]))
        .unwrap();

    let err = engine
        .process_message(
            &mut cx,
            CertificateVerify,
            &certificate_verify(SignatureScheme::ED448),
        )
        .unwrap_err();
    assert_eq!(err, Error::UnsupportedSignatureScheme(SignatureScheme::ED448));
    assert_eq!(err.kind(), ErrorKind::Negotiation);
}

#[test]
fn transcript_covers_every_handshake_message() {
    let engine = make_engine(default_builder());
    let mut cx = engine.new_context();
    assert!(cx.transcript_hash().is_none());

    let hello = ClientHelloBuilder::new().build_framed();
    engine
        .process_handshake(&mut cx, &hello)
        .unwrap();
    engine.advance(&mut cx).unwrap();

    let mut expected = hello.clone();
    for message in cx.take_outgoing() {
        expected.extend_from_slice(&message.bytes);
    }
    let ckx = client_key_exchange(&[0x33; 4]);
    engine
        .process_message(&mut cx, ClientKeyExchange, &ckx)
        .unwrap();
    expected.extend_from_slice(&[0x10, 0x00, 0x00, ckx.len() as u8]);
    expected.extend_from_slice(&ckx);

    // CCS is not a handshake message
    engine
        .process_message(&mut cx, ChangeCipherSpec, CCS)
        .unwrap();

    // default preference picks a SHA-1 suite, hashed with SHA-256
    let suite = cx.suite().unwrap();
    assert_eq!(suite.info.prf_hash(), &digest::SHA256);
    assert_eq!(
        cx.transcript_hash().unwrap().as_ref(),
        digest::digest(&digest::SHA256, &expected).as_ref()
    );
}

#[test]
fn server_name_selects_certificate() {
    let records = vec![
        make_record("default", &["default.example.com"]),
        make_record("www", &["www.example.com", "*.cdn.example.com"]),
    ];
    let engine = make_engine(ServerConfig::builder().with_modules(make_modules(records)));

    let chosen = |name: Option<&str>| {
        let mut cx = engine.new_context();
        let mut hello = ClientHelloBuilder::new();
        if let Some(name) = name {
            hello = hello.sni(name);
        }
        engine
            .process_message(&mut cx, ClientHello, &hello.build())
            .unwrap();
        engine.advance(&mut cx).unwrap();

        let out = cx.take_outgoing();
        let certs = CertificatePayload::read_bytes(&out[1].bytes[4..]).unwrap();
        assert_eq!(certs.0, cx.server_certificate());
        (
            engine
                .config()
                .modules()
                .find_certificate(&tls12_handshake::CertificateCriterion::Any)
                .unwrap()
                .chain()
                == cx.server_certificate(),
            cx.server_name().map(str::to_owned),
        )
    };

    assert_eq!(chosen(None), (true, None));
    assert_eq!(
        chosen(Some("www.example.com")),
        (false, Some("www.example.com".to_string()))
    );
    assert_eq!(
        chosen(Some("img.cdn.example.com")),
        (false, Some("img.cdn.example.com".to_string()))
    );
    assert_eq!(chosen(Some("unknown.example.org")), (true, None));
}

#[test]
fn certificates_load_from_pem_files() {
    let paths = write_pem_pair("pem", &["pem.example.com"]);
    let store = CertificateStore::load(&[paths.clone()]).unwrap();
    let record = &store.records()[0];
    assert_eq!(record.common_name(), Some("pem"));
    assert_eq!(record.dns_names(), &["pem.example.com".to_string()]);
    assert_eq!(record.paths(), Some(&paths));

    let mut modules = ModuleRegistry::new();
    modules
        .init_module(ModuleId::Certificates, CertificateStore::init, vec![paths])
        .unwrap();
    assert!(modules
        .check_all_initialized(&[ModuleId::Certificates])
        .is_ok());
}

#[test]
fn unreadable_certificate_fails_module_init() {
    let mut modules = ModuleRegistry::new();
    let err = modules
        .init_module(
            ModuleId::Certificates,
            CertificateStore::init,
            vec![tls12_handshake::CertPaths::new(
                "/nonexistent/a.crt",
                "/nonexistent/a.key",
            )],
        )
        .unwrap_err();
    assert!(matches!(err, Error::ModuleInit(ModuleId::Certificates, _)));
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(modules.lookup(ModuleId::Certificates).is_none());
}

#[test]
fn messages_out_of_order() {
    let engine = make_engine(default_builder());
    let mut cx = engine.new_context();

    let err = engine
        .process_message(&mut cx, ClientKeyExchange, &client_key_exchange(&[1]))
        .unwrap_err();
    assert_eq!(
        err,
        Error::InappropriateHandshakeMessage {
            expect_types: vec![ClientHello],
            got_type: ClientKeyExchange,
        }
    );
    assert_eq!(err.kind(), ErrorKind::FlowOrder);
    assert!(cx.order().is_empty());
    assert_eq!(cx.steps(), 0);
}

#[test]
fn client_cannot_jump_the_server_flight() {
    let engine = make_engine(default_builder());
    let mut cx = engine.new_context();
    engine
        .process_message(&mut cx, ClientHello, &ClientHelloBuilder::new().build())
        .unwrap();

    assert_eq!(
        engine.process_message(&mut cx, ClientKeyExchange, &client_key_exchange(&[1])),
        Err(Error::ServerFlightPending(ServerHello))
    );
    // poisoned
    assert_eq!(
        engine.advance(&mut cx),
        Err(Error::ServerFlightPending(ServerHello))
    );
}

#[test]
fn second_client_hello_is_refused() {
    let engine = make_engine(default_builder());
    let mut cx = engine.new_context();
    hello_and_flight(&engine, &mut cx);

    assert_eq!(
        engine.process_message(&mut cx, ClientHello, &ClientHelloBuilder::new().build()),
        Err(Error::InappropriateHandshakeMessage {
            expect_types: vec![ClientKeyExchange],
            got_type: ClientHello,
        })
    );
}

#[test]
fn nothing_after_finished() {
    let engine = make_engine(default_builder());
    let mut cx = engine.new_context();
    hello_and_flight(&engine, &mut cx);
    engine
        .process_message(&mut cx, ClientKeyExchange, &client_key_exchange(&[1]))
        .unwrap();
    engine
        .process_message(&mut cx, ChangeCipherSpec, CCS)
        .unwrap();
    engine
        .process_message(&mut cx, Finished, FINISHED)
        .unwrap();

    for stage in [ClientHello, Finished, ChangeCipherSpec] {
        assert_eq!(
            engine.process_message(&mut cx, stage, &[]),
            Err(Error::HandshakeAlreadyComplete)
        );
    }
    assert_eq!(engine.advance(&mut cx), Err(Error::HandshakeAlreadyComplete));
    assert_eq!(cx.steps(), 8);
}

#[test]
fn step_limit_is_enforced() {
    let engine = make_engine(default_builder().with_max_steps(3));
    let mut cx = engine.new_context();
    engine
        .process_message(&mut cx, ClientHello, &ClientHelloBuilder::new().build())
        .unwrap();

    let err = engine.advance(&mut cx).unwrap_err();
    assert_eq!(err, Error::StepLimitReached(3));
    assert_eq!(cx.steps(), 3);
    assert_eq!(cx.order(), &[ClientHello, ServerHello, Certificate]);
    assert_eq!(cx.stage(), ServerHelloDone);
}

#[test]
fn truncated_finished() {
    let engine = make_engine(default_builder());
    let mut cx = engine.new_context();
    hello_and_flight(&engine, &mut cx);
    engine
        .process_message(&mut cx, ClientKeyExchange, &client_key_exchange(&[1]))
        .unwrap();
    engine
        .process_message(&mut cx, ChangeCipherSpec, CCS)
        .unwrap();
    assert_eq!(
        engine.process_message(&mut cx, Finished, &[0; 11]),
        Err(Error::InvalidMessage(InvalidMessage::TruncatedField("Finished")))
    );
    assert!(!cx.is_complete());
}

#[test]
fn empty_key_exchange_for_dhe() {
    let engine = make_engine(default_builder());
    let mut cx = engine.new_context();
    engine
        .process_message(
            &mut cx,
            ClientHello,
            &ClientHelloBuilder::new()
                .suites(&[0x009e])
                .build(),
        )
        .unwrap();
    engine.advance(&mut cx).unwrap();
    assert_eq!(
        engine.process_message(&mut cx, ClientKeyExchange, &client_key_exchange(&[])),
        Err(Error::InvalidMessage(InvalidMessage::IllegalEmptyList(
            "ClientKeyExchange"
        )))
    );
}

#[test]
fn start_at_server_hello_done() {
    let engine = make_engine(default_builder().with_initial_stage(ServerHelloDone));
    let mut cx = engine.new_context();
    assert!(!cx.awaiting_peer());
    engine.advance(&mut cx).unwrap();

    let out = cx.take_outgoing();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].stage, ServerHelloDone);
    assert_eq!(out[0].bytes, vec![0x0e, 0x00, 0x00, 0x00]);
    assert_eq!(cx.order(), &[ServerHelloDone]);
    assert_eq!(cx.stage(), ClientKeyExchange);
}

#[test]
fn concurrent_handshakes_share_one_engine() {
    let engine = Arc::new(make_engine(default_builder()));

    let handles = (0..8u8)
        .map(|i| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let mut cx = engine.new_context();
                engine
                    .process_message(&mut cx, ClientHello, &ClientHelloBuilder::new().build())
                    .unwrap();
                engine.advance(&mut cx).unwrap();
                engine
                    .process_message(&mut cx, ClientKeyExchange, &client_key_exchange(&[i; 8]))
                    .unwrap();
                engine
                    .process_message(&mut cx, ChangeCipherSpec, CCS)
                    .unwrap();
                engine
                    .process_message(&mut cx, Finished, &[i; 12])
                    .unwrap();
                cx
            })
        })
        .collect::<Vec<_>>();

    for (i, handle) in handles.into_iter().enumerate() {
        let cx = handle.join().unwrap();
        assert!(cx.is_complete());
        assert_eq!(cx.client_verify_data(), Some(&[i as u8; 12]));
        assert_eq!(cx.client_key_exchange(), Some(&[i as u8; 8][..]));
        assert_eq!(cx.steps(), 8);
    }
}

#[test]
fn one_failure_leaves_other_contexts_alone() {
    let engine = make_engine(default_builder());
    let mut bad = engine.new_context();
    let mut good = engine.new_context();

    assert!(engine
        .process_message(&mut bad, Finished, FINISHED)
        .is_err());
    engine
        .process_message(&mut good, ClientHello, &ClientHelloBuilder::new().build())
        .unwrap();
    assert!(good.error().is_none());
    assert!(bad.error().is_some());
}

#[test]
fn engine_is_send_and_sync() {
    fn check<T: Send + Sync>() {}
    check::<HandshakeEngine>();
    check::<HandshakeContext>();
}

#[test]
fn missing_module_stops_config() {
    let err = ServerConfig::builder()
        .with_modules(ModuleRegistry::new())
        .build()
        .unwrap_err();
    assert_eq!(err, Error::MissingModule(ModuleId::CipherSuites));
}
