use ring::digest;

use crate::error::Error;

/// Page requested before login so the device hands out its first token.
pub const LOGIN_PAGE: &str = "/common_page/login.html";
/// Cookie carrying the rotating per-request token.
pub const SESSION_TOKEN_COOKIE: &str = "sessionToken";
/// Cookie carrying the session identifier returned in the login reply.
pub const SESSION_ID_COOKIE: &str = "SID";
pub const DEFAULT_USERNAME: &str = "NULL";

const LOGIN_SUCCESS: &str = "success";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Getter,
    Setter,
}

impl Endpoint {
    pub const fn path(self) -> &'static str {
        match self {
            Endpoint::Getter => "/xml/getter.xml",
            Endpoint::Setter => "/xml/setter.xml",
        }
    }
}

/// RPC functions understood by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Login,
    Logout,
    SystemInfo,
    State,
    LanUserTable,
}

impl Function {
    pub const fn code(self) -> &'static str {
        match self {
            Function::Login => "15",
            Function::Logout => "16",
            Function::SystemInfo => "2",
            Function::State => "136",
            Function::LanUserTable => "123",
        }
    }

    pub const fn endpoint(self) -> Endpoint {
        match self {
            Function::Login | Function::Logout => Endpoint::Setter,
            Function::SystemInfo | Function::State | Function::LanUserTable => Endpoint::Getter,
        }
    }
}

/// SHA-256 of the password as lowercase hex, the form the device expects.
pub fn hash_password(password: &str) -> String {
    hex::encode(digest::digest(&digest::SHA256, password.as_bytes()))
}

/// Extracts the session id from a login reply such as `success;SID=123`.
pub fn parse_login_reply(reply: &str) -> Result<String, Error> {
    if !reply.starts_with(LOGIN_SUCCESS) {
        return Err(Error::InvalidLoginResponse(reply.to_string()));
    }

    reply
        .split(';')
        .filter_map(|segment| segment.split_once('='))
        .find(|(key, _)| key.trim() == SESSION_ID_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|sid| !sid.is_empty())
        .ok_or(Error::MissingSessionId)
}
