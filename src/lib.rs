use log::{debug, info};
use tokio_util::sync::CancellationToken;
use url::Url;

pub mod args;
pub mod config;
pub mod error;
pub mod poll;
pub mod protocol;
pub mod record;
pub mod transport;
pub mod units;

pub use crate::error::{DecodeError, Error};
pub use crate::poll::Snapshot;
pub use crate::record::{ClientInfo, Connection, LanUserTable, Record, State, SystemInfo};
pub use crate::transport::{HttpTransport, Reply, Transport};

use crate::args::Args;
use crate::protocol::{
    hash_password, parse_login_reply, Function, LOGIN_PAGE, SESSION_ID_COOKIE,
    SESSION_TOKEN_COOKIE,
};

/// Client for one Connect Box.
///
/// The device serves a single session at a time and rotates its token on
/// every response, so calls on one client must not overlap.
pub struct ConnectBox<T: Transport + ?Sized = HttpTransport> {
    url: Url,
    username: String,
    /// SHA-256 hex of the password.
    password: String,
    /// Last seen value of the session token cookie.
    token: String,
    transport: Box<T>,
}

impl ConnectBox<HttpTransport> {
    pub fn new(addr: &str, username: &str, password: &str) -> Result<ConnectBox, Error> {
        ConnectBox::with_transport(addr, username, password, HttpTransport::new()?)
    }
}

impl<T> ConnectBox<T>
where
    T: Transport,
{
    pub fn with_transport(
        addr: &str,
        username: &str,
        password: &str,
        transport: T,
    ) -> Result<ConnectBox<T>, Error> {
        Ok(ConnectBox {
            url: parse_address(addr)?,
            username: username.to_string(),
            password: hash_password(password),
            token: String::new(),
            transport: Box::new(transport),
        })
    }

    pub fn address(&self) -> &Url {
        &self.url
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Token that will be sent with the next RPC call.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub async fn login(&mut self, ctx: &CancellationToken) -> Result<(), Error> {
        let page = self.endpoint_url(LOGIN_PAGE)?;
        match self.exchange(ctx, page, None).await {
            Ok(_) => {}
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(err) => return Err(Error::LoginFailed(Box::new(err))),
        }

        let args = Args::new()
            .with("Username", &self.username)
            .with("Password", &self.password);
        let reply = self.call(ctx, Function::Login, args).await?;
        let sid = parse_login_reply(&reply)?;

        // The device reports the session id in the body only.
        self.transport.set_cookie(&self.url, SESSION_ID_COOKIE, &sid);
        info!("Logged in to {}", self.url);

        Ok(())
    }

    pub async fn logout(&mut self, ctx: &CancellationToken) -> Result<(), Error> {
        self.call(ctx, Function::Logout, Args::new()).await?;
        info!("Logged out of {}", self.url);

        Ok(())
    }

    /// Requests `R` from the getter endpoint and decodes it.
    pub async fn fetch<R: Record>(&mut self, ctx: &CancellationToken) -> Result<R, Error> {
        let body = self.call(ctx, R::FUNCTION, Args::new()).await?;

        Ok(record::decode::<R>(&body)?)
    }

    async fn call(
        &mut self,
        ctx: &CancellationToken,
        function: Function,
        extra: Args,
    ) -> Result<String, Error> {
        let url = self.endpoint_url(function.endpoint().path())?;
        let mut args = Args::new()
            .with("token", &self.token)
            .with("fun", function.code());
        args.extend(extra);

        let reply = self.exchange(ctx, url, Some(args.encode())).await?;
        if !reply.status.is_success() {
            return Err(Error::UnexpectedStatus(reply.status));
        }

        Ok(reply.body)
    }

    /// Sends one request and picks up the token the response left behind.
    /// This is the only place `token` changes.
    ///
    /// Once a request has gone out the token is refreshed whatever the
    /// outcome: the response headers may have reached the cookie store even
    /// when reading the body failed or `ctx` fired midway.
    async fn exchange(
        &mut self,
        ctx: &CancellationToken,
        url: Url,
        form: Option<String>,
    ) -> Result<Reply, Error> {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        debug!("{} {}", if form.is_some() { "POST" } else { "GET" }, url);

        let transport = &self.transport;
        let request = async {
            match form {
                Some(body) => transport.post_form(&url, body).await,
                None => transport.get(&url).await,
            }
        };
        let result = tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(Error::Cancelled),
            result = request => result,
        };

        self.token = self
            .transport
            .cookie(&url, SESSION_TOKEN_COOKIE)
            .unwrap_or_default();

        let reply = result?;
        debug!("{} answered {}", url, reply.status);

        Ok(reply)
    }

    fn endpoint_url(&self, path: &str) -> Result<Url, Error> {
        self.url.join(path).map_err(|source| Error::InvalidAddress {
            addr: self.url.to_string(),
            source,
        })
    }
}

/// Adds `http://` when `addr` carries no scheme and validates the result.
fn parse_address(addr: &str) -> Result<Url, Error> {
    let normalized = if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.to_string()
    } else {
        format!("http://{}", addr)
    };
    let invalid = |source: url::ParseError| Error::InvalidAddress {
        addr: addr.to_string(),
        source,
    };

    let url = Url::parse(&normalized).map_err(invalid)?;
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid(url::ParseError::EmptyHost));
    }

    Ok(url)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    pub struct SentRequest {
        pub path: String,
        pub body: Option<String>,
    }

    struct Scripted {
        reply: Result<Reply, String>,
        cookies: Vec<(String, Option<String>)>,
    }

    #[derive(Default)]
    struct MockState {
        replies: VecDeque<Scripted>,
        requests: Vec<SentRequest>,
        cookies: HashMap<String, String>,
    }

    /// Plays back scripted replies and records what the client sent.
    #[derive(Clone, Default)]
    pub struct MockTransport {
        state: Arc<Mutex<MockState>>,
    }

    impl MockTransport {
        pub fn new() -> MockTransport {
            MockTransport::default()
        }

        /// Queues a reply; `cookies` are applied to the store when it is
        /// delivered, `None` removing the cookie.
        pub fn reply(&self, status: u16, body: &str, cookies: &[(&str, Option<&str>)]) {
            self.state.lock().unwrap().replies.push_back(Scripted {
                reply: Ok(Reply {
                    status: StatusCode::from_u16(status).unwrap(),
                    body: body.to_string(),
                }),
                cookies: cookies
                    .iter()
                    .map(|(n, v)| (n.to_string(), v.map(str::to_string)))
                    .collect(),
            });
        }

        pub fn fail(&self, message: &str) {
            self.fail_after_headers(message, &[]);
        }

        /// Queues a failure that happens after `cookies` reached the store,
        /// like a connection reset while reading the body.
        pub fn fail_after_headers(&self, message: &str, cookies: &[(&str, Option<&str>)]) {
            self.state.lock().unwrap().replies.push_back(Scripted {
                reply: Err(message.to_string()),
                cookies: cookies
                    .iter()
                    .map(|(n, v)| (n.to_string(), v.map(str::to_string)))
                    .collect(),
            });
        }

        pub fn requests(&self) -> Vec<SentRequest> {
            self.state.lock().unwrap().requests.clone()
        }

        pub fn stored_cookie(&self, name: &str) -> Option<String> {
            self.state.lock().unwrap().cookies.get(name).cloned()
        }

        fn deliver(&self, url: &Url, body: Option<String>) -> Result<Reply, Error> {
            let mut state = self.state.lock().unwrap();
            state.requests.push(SentRequest {
                path: url.path().to_string(),
                body,
            });
            let scripted = state
                .replies
                .pop_front()
                .expect("no reply scripted for request");
            for (name, value) in scripted.cookies {
                match value {
                    Some(value) => state.cookies.insert(name, value),
                    None => state.cookies.remove(&name),
                };
            }

            scripted.reply.map_err(|m| Error::Transport(m.into()))
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn get(&self, url: &Url) -> Result<Reply, Error> {
            self.deliver(url, None)
        }

        async fn post_form(&self, url: &Url, body: String) -> Result<Reply, Error> {
            self.deliver(url, Some(body))
        }

        fn cookie(&self, _url: &Url, name: &str) -> Option<String> {
            self.stored_cookie(name)
        }

        fn set_cookie(&self, _url: &Url, name: &str, value: &str) {
            self.state
                .lock()
                .unwrap()
                .cookies
                .insert(name.to_string(), value.to_string());
        }
    }

    pub fn connectbox_with_mock() -> (ConnectBox<MockTransport>, MockTransport) {
        let transport = MockTransport::new();
        let connectbox =
            ConnectBox::with_transport("192.168.0.1", "bob", "qwerty", transport.clone())
                .expect("No valid address.");

        (connectbox, transport)
    }

    const QWERTY_HASH: &str = "65e84be33532fb784c48129675f9eff3a682b27168c0ea744b2cf58ee02337c5";

    #[test]
    fn connectbox_new_should_normalize_address_and_hash_password() {
        // Arrange

        // Act
        let connectbox = ConnectBox::new("127.0.0.1:8080", "bob", "qwerty").unwrap();

        // Assert
        assert_eq!("http://127.0.0.1:8080/", connectbox.address().as_str());
        assert_eq!("bob", connectbox.username());
        assert_eq!(QWERTY_HASH, connectbox.password);
        assert_eq!("", connectbox.token());
    }

    #[test]
    fn connectbox_new_should_keep_explicit_scheme() {
        let connectbox = ConnectBox::new("https://192.168.0.1", "bob", "qwerty").unwrap();

        assert_eq!("https://192.168.0.1/", connectbox.address().as_str());
    }

    #[test]
    fn connectbox_new_should_reject_invalid_address() {
        let result = ConnectBox::new("hello, world!", "bob", "qwerty");

        assert!(matches!(result, Err(Error::InvalidAddress { .. })));
    }

    #[tokio::test]
    async fn connectbox_login_should_prime_token_and_store_sid() {
        // Arrange
        let (mut connectbox, transport) = connectbox_with_mock();
        transport.reply(200, "<html/>", &[("sessionToken", Some("t1"))]);
        transport.reply(200, "success;SID=XYZ", &[("sessionToken", Some("t2"))]);
        let ctx = CancellationToken::new();

        // Act
        connectbox.login(&ctx).await.unwrap();

        // Assert
        let requests = transport.requests();
        assert_eq!(
            vec![
                SentRequest {
                    path: "/common_page/login.html".to_string(),
                    body: None,
                },
                SentRequest {
                    path: "/xml/setter.xml".to_string(),
                    body: Some(format!(
                        "token=t1&fun=15&Username=bob&Password={}",
                        QWERTY_HASH
                    )),
                },
            ],
            requests
        );
        assert_eq!("t2", connectbox.token());
        assert_eq!(Some("XYZ".to_string()), transport.stored_cookie("SID"));
    }

    #[tokio::test]
    async fn connectbox_should_send_cookie_token_not_sid_after_login() {
        // Arrange
        let (mut connectbox, transport) = connectbox_with_mock();
        transport.reply(200, "", &[("sessionToken", Some("t1"))]);
        transport.reply(200, "success;SID=XYZ", &[("sessionToken", Some("t2"))]);
        transport.reply(200, "", &[("sessionToken", Some("t3"))]);
        let ctx = CancellationToken::new();
        connectbox.login(&ctx).await.unwrap();

        // Act
        connectbox.logout(&ctx).await.unwrap();

        // Assert
        let requests = transport.requests();
        assert_eq!(
            Some("token=t2&fun=16".to_string()),
            requests[2].body.clone()
        );
        assert_eq!("t3", connectbox.token());
    }

    #[tokio::test]
    async fn connectbox_login_should_reject_unsuccessful_reply() {
        let (mut connectbox, transport) = connectbox_with_mock();
        transport.reply(200, "", &[]);
        transport.reply(200, "idloginincorrect", &[]);

        let result = connectbox.login(&CancellationToken::new()).await;

        match result {
            Err(Error::InvalidLoginResponse(body)) => assert_eq!("idloginincorrect", body),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn connectbox_login_should_reject_reply_without_sid() {
        let (mut connectbox, transport) = connectbox_with_mock();
        transport.reply(200, "", &[]);
        transport.reply(200, "success;lang=en", &[]);

        let result = connectbox.login(&CancellationToken::new()).await;

        assert!(matches!(result, Err(Error::MissingSessionId)));
        assert_eq!(None, transport.stored_cookie("SID"));
    }

    #[tokio::test]
    async fn connectbox_login_should_wrap_login_page_failure() {
        let (mut connectbox, transport) = connectbox_with_mock();
        transport.fail("connection refused");

        let result = connectbox.login(&CancellationToken::new()).await;

        match result {
            Err(Error::LoginFailed(inner)) => assert!(matches!(*inner, Error::Transport(_))),
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(1, transport.requests().len());
    }

    #[tokio::test]
    async fn connectbox_login_should_ignore_login_page_status() {
        let (mut connectbox, transport) = connectbox_with_mock();
        transport.reply(302, "", &[("sessionToken", Some("t1"))]);
        transport.reply(200, "success;SID=1", &[]);

        let result = connectbox.login(&CancellationToken::new()).await;

        assert!(result.is_ok(), "{:?}", result);
    }

    #[tokio::test]
    async fn connectbox_logout_should_work_without_prior_requests() {
        // Arrange
        let (mut connectbox, transport) = connectbox_with_mock();
        transport.reply(200, "", &[]);

        // Act
        let result = connectbox.logout(&CancellationToken::new()).await;

        // Assert
        assert!(result.is_ok());
        assert_eq!(
            Some("token=&fun=16".to_string()),
            transport.requests()[0].body.clone()
        );
    }

    #[tokio::test]
    async fn connectbox_logout_should_send_current_token() {
        let (mut connectbox, transport) = connectbox_with_mock();
        connectbox.token = "abc".to_string();
        transport.reply(200, "", &[]);

        connectbox.logout(&CancellationToken::new()).await.unwrap();

        assert_eq!(
            vec![SentRequest {
                path: "/xml/setter.xml".to_string(),
                body: Some("token=abc&fun=16".to_string()),
            }],
            transport.requests()
        );
    }

    #[tokio::test]
    async fn connectbox_fetch_should_decode_record() {
        // Arrange
        let (mut connectbox, transport) = connectbox_with_mock();
        connectbox.token = "abc".to_string();
        transport.reply(
            200,
            "<?xml version=\"1.0\"?><cmstate>\
             <TunnerTemperature>50</TunnerTemperature>\
             <Temperature>32</Temperature>\
             <OperState>OPERATIONAL</OperState>\
             <wan_ipv4_addr>1.1.1.1</wan_ipv4_addr>\
             </cmstate>",
            &[("sessionToken", Some("def"))],
        );

        // Act
        let state = connectbox
            .fetch::<State>(&CancellationToken::new())
            .await
            .unwrap();

        // Assert
        assert_eq!(10, state.tuner_temperature);
        assert_eq!(0, state.temperature);
        assert!(state.wan_ipv6_addrs.is_empty());
        assert_eq!(
            vec![SentRequest {
                path: "/xml/getter.xml".to_string(),
                body: Some("token=abc&fun=136".to_string()),
            }],
            transport.requests()
        );
        assert_eq!("def", connectbox.token());
    }

    #[tokio::test]
    async fn connectbox_fetch_should_distinguish_xml_and_field_failures() {
        let (mut connectbox, transport) = connectbox_with_mock();
        transport.reply(200, "<?xml", &[]);
        transport.reply(
            200,
            "<cmsysteminfo>\
             <cm_docsis_mode>DOCSIS 3.0</cm_docsis_mode>\
             <cm_hardware_version>5.01</cm_hardware_version>\
             <cm_mac_addr>00:00:00:00:00:00</cm_mac_addr>\
             <cm_serial_number>AAAAAAAAAAAA</cm_serial_number>\
             <cm_system_uptime>hello, world</cm_system_uptime>\
             <cm_network_access>Allowed</cm_network_access>\
             </cmsysteminfo>",
            &[],
        );
        let ctx = CancellationToken::new();

        let malformed = connectbox.fetch::<SystemInfo>(&ctx).await;
        let invalid = connectbox.fetch::<SystemInfo>(&ctx).await;

        assert!(matches!(malformed, Err(Error::Decode(DecodeError::Xml(_)))));
        assert!(matches!(
            invalid,
            Err(Error::Decode(DecodeError::InvalidDuration(_)))
        ));
    }

    #[tokio::test]
    async fn connectbox_should_refresh_token_on_error_status() {
        // Arrange
        let (mut connectbox, transport) = connectbox_with_mock();
        connectbox.token = "abc".to_string();
        transport.reply(500, "", &[("sessionToken", Some("def"))]);

        // Act
        let result = connectbox.fetch::<State>(&CancellationToken::new()).await;

        // Assert
        match result {
            Err(Error::UnexpectedStatus(status)) => {
                assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, status)
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!("def", connectbox.token());
    }

    #[tokio::test]
    async fn connectbox_should_refresh_token_when_body_read_fails() {
        // Arrange
        let (mut connectbox, transport) = connectbox_with_mock();
        connectbox.token = "t1".to_string();
        transport.fail_after_headers("connection reset", &[("sessionToken", Some("t2"))]);
        transport.reply(200, "", &[]);
        let ctx = CancellationToken::new();

        // Act
        let result = connectbox.fetch::<State>(&ctx).await;
        connectbox.logout(&ctx).await.unwrap();

        // Assert
        assert!(matches!(result, Err(Error::Transport(_))));
        assert_eq!(
            Some("token=t2&fun=16".to_string()),
            transport.requests()[1].body.clone()
        );
    }

    #[tokio::test]
    async fn connectbox_should_clear_token_when_cookie_disappears() {
        let (mut connectbox, transport) = connectbox_with_mock();
        transport.reply(200, "", &[("sessionToken", Some("t1"))]);
        transport.reply(200, "", &[("sessionToken", None)]);
        let ctx = CancellationToken::new();

        connectbox.logout(&ctx).await.unwrap();
        assert_eq!("t1", connectbox.token());
        connectbox.logout(&ctx).await.unwrap();

        assert_eq!("", connectbox.token());
    }

    #[tokio::test]
    async fn connectbox_should_not_send_when_cancelled() {
        // Arrange
        let (mut connectbox, transport) = connectbox_with_mock();
        connectbox.token = "abc".to_string();
        let ctx = CancellationToken::new();
        ctx.cancel();

        // Act
        let login = connectbox.login(&ctx).await;
        let fetch = connectbox.fetch::<LanUserTable>(&ctx).await;

        // Assert
        assert!(matches!(login, Err(Error::Cancelled)));
        assert!(matches!(fetch, Err(Error::Cancelled)));
        assert!(transport.requests().is_empty());
        assert_eq!("abc", connectbox.token());
    }
}
