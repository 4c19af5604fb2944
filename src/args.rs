use url::form_urlencoded;

/// Ordered name/value pairs of an RPC call.
///
/// Names may repeat and are never reordered: the device reads the body
/// positionally, with `token` and `fun` first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args {
    pairs: Vec<(String, String)>,
}

impl Args {
    pub fn new() -> Args {
        Args::default()
    }

    pub fn with(mut self, name: &str, value: &str) -> Args {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: &str, value: &str) {
        self.pairs.push((name.to_string(), value.to_string()));
    }

    pub fn extend(&mut self, other: Args) {
        self.pairs.extend(other.pairs);
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn encode(&self) -> String {
        encode(&self.pairs)
    }
}

/// Form-encodes `pairs` as `name=value&...` in the given order.
pub fn encode<N, V>(pairs: &[(N, V)]) -> String
where
    N: AsRef<str>,
    V: AsRef<str>,
{
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter().map(|(n, v)| (n.as_ref(), v.as_ref())))
        .finish()
}
