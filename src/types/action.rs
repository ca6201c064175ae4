//! CRUD action codes and their transport verb mapping

use serde::{Deserialize, Serialize};

/// One of the four fixed operations a packet can request.
///
/// On the wire an action is a single byte: `c`, `r`, `u` or `d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    /// All actions in wire-code order.
    pub const ALL: [Action; 4] = [Action::Create, Action::Read, Action::Update, Action::Delete];

    /// Wire byte for this action.
    pub const fn code(self) -> u8 {
        match self {
            Action::Create => b'c',
            Action::Read => b'r',
            Action::Update => b'u',
            Action::Delete => b'd',
        }
    }

    /// Parse a wire byte. Returns `None` for anything outside `c`/`r`/`u`/`d`.
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            b'c' => Some(Action::Create),
            b'r' => Some(Action::Read),
            b'u' => Some(Action::Update),
            b'd' => Some(Action::Delete),
            _ => None,
        }
    }

    /// Map a conventional transport verb (POST, GET, PUT, DELETE).
    pub fn from_method(method: &str) -> Option<Self> {
        match method {
            "POST" => Some(Action::Create),
            "GET" => Some(Action::Read),
            "PUT" => Some(Action::Update),
            "DELETE" => Some(Action::Delete),
            _ => None,
        }
    }

    /// Transport verb for this action.
    pub const fn method(self) -> &'static str {
        match self {
            Action::Create => "POST",
            Action::Read => "GET",
            Action::Update => "PUT",
            Action::Delete => "DELETE",
        }
    }

    /// Wire byte as a printable character, used in error messages.
    pub const fn as_char(self) -> char {
        self.code() as char
    }
}

impl From<Action> for u8 {
    fn from(action: Action) -> Self {
        action.code()
    }
}

impl TryFrom<u8> for Action {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Action::from_code(code).ok_or_else(|| format!("invalid action code {code:#04x}"))
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Translate a transport verb to its action byte; unknown verbs map to `0`.
pub fn method_to_action_code(method: &str) -> u8 {
    Action::from_method(method).map_or(0, Action::code)
}

/// Translate an action byte to its transport verb; unknown bytes map to `""`.
pub fn action_code_to_method(code: u8) -> &'static str {
    Action::from_code(code).map_or("", Action::method)
}
