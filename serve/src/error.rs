//! Errors raised by the `serve` façade itself (request validation, agent
//! lookup, provider wiring) as opposed to errors from inside a run, which
//! travel back as a `RunEnd`/`ProtocolEvent::Error` with `loom::LoomError`'s
//! message.

#[derive(Debug, thiserror::Error)]
pub(crate) enum ServeError {
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("agent {0} has no llm.provider configured and no default is set")]
    NoProvider(String),

    #[error("unsupported llm provider: {0}")]
    UnsupportedProvider(String),

    #[error("missing environment variable {0} for provider {1}")]
    MissingEnv(&'static str, &'static str),

    #[error("agent registry error: {0}")]
    Registry(#[from] loom::AgentRegistryError),

    #[error("store error: {0}")]
    Store(String),
}
