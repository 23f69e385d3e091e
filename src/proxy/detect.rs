//! Provider signature detection from host/path pairs.

/// A known provider signature. Hosts match by case-insensitive substring,
/// paths by prefix.
struct Signature {
    provider: &'static str,
    host_fragment: &'static str,
    path_prefix: &'static str,
}

const SIGNATURES: &[Signature] = &[
    Signature {
        provider: "openai",
        host_fragment: "openai.com",
        path_prefix: "/v1/chat/completions",
    },
    Signature {
        provider: "anthropic",
        host_fragment: "anthropic.com",
        path_prefix: "/v1/messages",
    },
];

/// Identify the provider an upstream host/path pair belongs to. First match
/// wins; unrecognized pairs yield the empty string, meaning the call is
/// forwarded uninstrumented.
pub fn detect_provider(host: &str, path: &str) -> &'static str {
    let host = host.to_ascii_lowercase();
    let path = path.to_ascii_lowercase();
    for sig in SIGNATURES {
        if host.contains(sig.host_fragment) || path.starts_with(sig.path_prefix) {
            return sig.provider;
        }
    }
    ""
}
