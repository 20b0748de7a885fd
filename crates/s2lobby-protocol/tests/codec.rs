//! Codec laws across the whole message table.

use bytes::{Bytes, BytesMut};
use s2lobby_protocol::messages::{AddGameServer, ChangeGameServer, GameServerData, RequestLogin};
use s2lobby_protocol::{
    Codec, Envelope, FieldType, MessageType, SchemaCodec, Value, WireString, decode_values,
    encode_values,
};

/// Builds one value per field; `seed` varies contents between runs.
fn values_for(ty: MessageType, seed: usize) -> Vec<Value> {
    ty.schema()
        .iter()
        .enumerate()
        .map(|(i, def)| {
            let n = seed + i;
            match def.ty {
                FieldType::U8 => Value::U8(n as u8),
                FieldType::U16 => Value::U16(ty.code()),
                FieldType::U32 => Value::U32((n as u32).wrapping_mul(0x0101_0101)),
                FieldType::Bool => Value::Bool(n % 2 == 1),
                FieldType::String => Value::String("s".repeat(n % 5).into()),
                FieldType::Bytes => Value::Bytes(vec![n as u8; n % 4]),
            }
        })
        .collect()
}

#[test]
fn test_every_schema_decodes_what_it_encodes() {
    for ty in MessageType::ALL {
        for seed in 0..6 {
            let values = values_for(*ty, seed);
            let mut buf = BytesMut::new();
            encode_values(ty.schema(), &values, &mut buf).unwrap();

            let mut bytes = buf.freeze();
            let decoded = decode_values(ty.schema(), &mut bytes).unwrap();
            assert_eq!(decoded, values, "{ty:?} seed {seed}");
            assert!(bytes.is_empty(), "{ty:?} left bytes behind");
        }
    }
}

#[test]
fn test_long_fields_survive() {
    // the largest string that still fits a 1024-byte frame with the rest of the body
    let msg = RequestLogin {
        nickname: "n".repeat(900).into(),
        password: WireString::new(),
        cdkey: vec![0xFF; 64],
        keypool: u16::MAX,
        patchlevel: u32::MAX,
        ticket_id: u32::MAX,
    };
    let payload = SchemaCodec.encode(msg.clone()).unwrap();
    assert!(payload.len() <= 1024);

    let (envelope, body) = Envelope::split(payload).unwrap();
    assert_eq!(envelope.message_type().unwrap(), MessageType::RequestLogin);
    let decoded: RequestLogin = SchemaCodec.decode(body).unwrap();
    assert_eq!(decoded, msg);
}

#[test]
fn test_room_messages_round_trip_typed() {
    let add = AddGameServer {
        name: "Roman Empire".into(),
        description: "2v2".into(),
        port: 5479,
        server_type: 1,
        lobby_id: 2,
        version: WireString::new(),
        max_players: 4,
        ai_players: 1,
        level: 3,
        game_mode: 1,
        hardcore: true,
        map: "Islands".into(),
        automatic_join: false,
        data: vec![1, 2, 3],
        ticket_id: 8,
    };
    let change = ChangeGameServer {
        server_id: 1,
        name: "renamed".into(),
        property_mask: 0xDEAD_BEEF,
        running: true,
        ..Default::default()
    };
    let data = GameServerData {
        server_id: 1,
        ip: "10.0.0.1".into(),
        curr_players: 2,
        ..Default::default()
    };

    let (_, body) = Envelope::split(SchemaCodec.encode(add.clone()).unwrap()).unwrap();
    assert_eq!(SchemaCodec.decode::<AddGameServer>(body).unwrap(), add);

    let (_, body) = Envelope::split(SchemaCodec.encode(change.clone()).unwrap()).unwrap();
    assert_eq!(SchemaCodec.decode::<ChangeGameServer>(body).unwrap(), change);

    let (_, body) = Envelope::split(SchemaCodec.encode(data.clone()).unwrap()).unwrap();
    assert_eq!(SchemaCodec.decode::<GameServerData>(body).unwrap(), data);
}

#[test]
fn test_every_truncation_point_is_an_error() {
    let payload = SchemaCodec
        .encode(GameServerData {
            name: "room".into(),
            data: vec![9; 5],
            ..Default::default()
        })
        .unwrap();
    let (_, body) = Envelope::split(payload).unwrap();

    for cut in 0..body.len() {
        let short = Bytes::copy_from_slice(&body[..cut]);
        assert!(
            SchemaCodec.decode::<GameServerData>(short).is_err(),
            "cut at {cut} decoded"
        );
    }
}
