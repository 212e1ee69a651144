//! Unified error type.

/// The error type returned by basalt's fallible operations.
///
/// Application-level outcomes (404, 422, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. Handlers that
/// return `Err` are routed to the dispatcher's server-error path; the
/// variants below cover what can actually go wrong on the way there.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A request body could not be decoded with the configured encoding.
    ///
    /// Local and recoverable: the handler receives it from
    /// [`decode_body`](crate::Context::decode_body) and decides the
    /// response (typically a 400).
    #[error("decode: {source}")]
    Decode {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A value could not be serialized by the configured encoding.
    #[error("encode: {source}")]
    Encode {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Template resolution or rendering failed.
    #[error("template: {0}")]
    Template(#[from] minijinja::Error),

    /// Listener or filesystem failure: binding a port, accepting a
    /// connection, reading a template or certificate file.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// The TLS key pair could not be loaded or the server config built.
    /// Fatal at startup.
    #[error("tls: {0}")]
    Tls(String),

    /// An application-level failure raised by a handler or middleware.
    #[error("{0}")]
    Message(String),
}

impl Error {
    /// An application-level error carrying just a message.
    ///
    /// ```rust
    /// # use basalt::Error;
    /// fn lookup(id: &str) -> Result<(), Error> {
    ///     Err(Error::msg(format!("no such user: {id}")))
    /// }
    /// ```
    pub fn msg(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }

    pub(crate) fn decode(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Decode { source: Box::new(source) }
    }

    pub(crate) fn encode(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Encode { source: Box::new(source) }
    }
}
