//! The lobby's application messages.
//!
//! Each message is declared once in the [`messages!`] table below as a
//! type code plus an ordered field list. The macro derives the typed
//! struct, its [`Message`] impl (schema and value conversion), and the
//! [`MessageType`] enum; the generic codec in [`crate::schema`] does the
//! rest. Every schema starts with a `type: u16` field because the client
//! repeats the type code at the front of the body.

use crate::error::SchemaError;
use crate::schema::{FieldDef, FieldType, Value, WireField, take_field};
use crate::types::{ResultCode, WireString};

/// A message with a fixed type code and a declarative schema.
pub trait Message: Sized + std::fmt::Debug {
    const TYPE: MessageType;
    const SCHEMA: &'static [FieldDef];

    /// Flattens the message into schema order, type echo first.
    fn into_values(self) -> Vec<Value>;

    /// Rebuilds the message from values in schema order.
    fn from_values(values: Vec<Value>) -> Result<Self, SchemaError>;
}

macro_rules! messages {
    ($(
        $(#[$meta:meta])*
        $name:ident = $code:literal {
            $( $field:ident : $ty:ty ),* $(,)?
        }
    )*) => {
        /// Type codes of every application message the lobby understands.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum MessageType {
            $( $name = $code, )*
        }

        impl MessageType {
            /// All known message types, in table order.
            pub const ALL: &'static [MessageType] = &[ $( MessageType::$name, )* ];

            pub fn from_code(code: u16) -> Option<Self> {
                match code {
                    $( $code => Some(MessageType::$name), )*
                    _ => None,
                }
            }

            pub fn code(self) -> u16 {
                self as u16
            }

            /// The body schema for this type.
            pub fn schema(self) -> &'static [FieldDef] {
                match self {
                    $( MessageType::$name => <$name as Message>::SCHEMA, )*
                }
            }
        }

        $(
            $(#[$meta])*
            #[derive(Debug, Clone, PartialEq, Eq, Default)]
            pub struct $name {
                $( pub $field: $ty, )*
            }

            impl Message for $name {
                const TYPE: MessageType = MessageType::$name;
                const SCHEMA: &'static [FieldDef] = &[
                    FieldDef::new("type", FieldType::U16),
                    $( FieldDef::new(stringify!($field), <$ty as WireField>::FIELD_TYPE), )*
                ];

                fn into_values(self) -> Vec<Value> {
                    vec![ Value::U16($code), $( self.$field.into_value(), )* ]
                }

                #[allow(unused_mut, unused_variables)]
                fn from_values(values: Vec<Value>) -> Result<Self, SchemaError> {
                    let expected = Self::SCHEMA.len();
                    if values.len() != expected {
                        return Err(SchemaError::FieldCount { expected, actual: values.len() });
                    }
                    let mut values = values.into_iter();
                    let _echo: u16 = take_field(&mut values, "type", expected)?;
                    Ok(Self {
                        $( $field: take_field(&mut values, stringify!($field), expected)?, )*
                    })
                }
            }
        )*
    };
}

messages! {
    /// Client chat line (2).
    ChatMessage = 2 {
        mode: u32,
        text: WireString,
        ticket_id: u32,
    }

    /// Login with an existing account (4).
    RequestLogin = 4 {
        nickname: WireString,
        password: WireString,
        cdkey: Vec<u8>,
        keypool: u16,
        patchlevel: u32,
        ticket_id: u32,
    }

    /// Generic request outcome (42).
    ResultMessage = 42 {
        error_code: u8,
        error_msg: WireString,
        ticket_id: u32,
    }

    /// Create an account and log in (71).
    RequestCreateAccount = 71 {
        nickname: WireString,
        password: WireString,
        cdkey: Vec<u8>,
        keypool: u16,
        patchlevel: u32,
        ticket_id: u32,
    }

    RequestMotd = 105 {
        ticket_id: u32,
    }

    Motd = 106 {
        text: WireString,
        ticket_id: u32,
    }

    RegObserverGlobalChat = 107 {
        ticket_id: u32,
    }

    DeregObserverGlobalChat = 108 {
        ticket_id: u32,
    }

    /// Presence notice: someone logged in (109).
    UserLoggedIn = 109 {
        user_id: u32,
        name: WireString,
    }

    /// Presence notice: someone left (110).
    UserLoggedOut = 110 {
        user_id: u32,
    }

    RegObserverUserLogin = 115 {
        send_all: bool,
        ticket_id: u32,
    }

    DeregObserverUserLogin = 116 {
        ticket_id: u32,
    }

    /// Request outcome carrying a created id (153).
    ResultId = 153 {
        error_code: u8,
        error_msg: WireString,
        id: u32,
        ticket_id: u32,
    }

    /// Chat line delivered to observers (165). `from_id` 0 is the server.
    Chat = 165 {
        text: WireString,
        from_id: u32,
    }

    /// Host a new game room (168).
    AddGameServer = 168 {
        name: WireString,
        description: WireString,
        port: u32,
        server_type: u8,
        lobby_id: u32,
        version: WireString,
        max_players: u8,
        ai_players: u8,
        level: u8,
        game_mode: u8,
        hardcore: bool,
        map: WireString,
        automatic_join: bool,
        data: Vec<u8>,
        ticket_id: u32,
    }

    /// Remove or start a room (169). Also broadcast as the removal notice.
    RemoveServer = 169 {
        server_id: u32,
        running: bool,
        ticket_id: u32,
    }

    /// Full room snapshot (170).
    GameServerData = 170 {
        server_id: u32,
        name: WireString,
        owner_id: u32,
        description: WireString,
        ip: WireString,
        port: u32,
        server_type: u8,
        lobby_id: u32,
        version: WireString,
        max_players: u8,
        curr_players: u8,
        ai_players: u8,
        level: u8,
        game_mode: u8,
        hardcore: bool,
        map: WireString,
        running: bool,
        data: Vec<u8>,
        ticket_id: u32,
    }

    RegObserverServerList = 171 {
        send_all: bool,
        server_type: u8,
        room_id: u32,
        selection: u32,
        ticket_id: u32,
    }

    DeregObserverServerList = 172 {
        ticket_id: u32,
    }

    /// Join someone else's room (175). `unused` is always zero.
    JoinServer = 175 {
        unused: u32,
        server_id: u32,
        ticket_id: u32,
    }

    LeaveServer = 176 {
        unused: u32,
        ticket_id: u32,
    }

    /// Owner edits its room (177).
    ChangeGameServer = 177 {
        server_id: u32,
        name: WireString,
        description: WireString,
        max_players: u8,
        slots_occupied: u8,
        level: u8,
        game_mode: u8,
        hardcore: bool,
        map: WireString,
        running: bool,
        data: Vec<u8>,
        property_mask: u32,
        ticket_id: u32,
    }
}

impl ResultMessage {
    pub fn ok(ticket_id: u32) -> Self {
        Self::with_code(ResultCode::OK, "", ticket_id)
    }

    pub fn with_code(code: ResultCode, message: impl Into<WireString>, ticket_id: u32) -> Self {
        Self {
            error_code: code.0,
            error_msg: message.into(),
            ticket_id,
        }
    }

    pub fn code(&self) -> ResultCode {
        ResultCode(self.error_code)
    }
}

impl ResultId {
    pub fn ok(id: u32, ticket_id: u32) -> Self {
        Self {
            error_code: ResultCode::OK.0,
            error_msg: WireString::new(),
            id,
            ticket_id,
        }
    }
}
