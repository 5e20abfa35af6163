//! Newtype wrappers for string identifiers used throughout the manifest.
//!
//! All newtypes serialize/deserialize as plain strings, so they can be used
//! directly as TOML table keys.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// A conda platform identifier ("subdir"), e.g. `linux-64` or `osx-arm64`.
    Subdir
);

string_newtype!(
    /// Name of a reusable dependency group in a multi-environment manifest.
    GroupName
);

/// Every platform identifier conda knows how to solve for.
pub const KNOWN_SUBDIRS: &[&str] = &[
    "noarch",
    "emscripten-wasm32",
    "wasi-wasm32",
    "freebsd-64",
    "linux-32",
    "linux-64",
    "linux-aarch64",
    "linux-armv6l",
    "linux-armv7l",
    "linux-ppc64",
    "linux-ppc64le",
    "linux-riscv64",
    "linux-s390x",
    "osx-64",
    "osx-arm64",
    "win-32",
    "win-64",
    "win-arm64",
    "zos-z",
];

impl Subdir {
    pub const NOARCH: &'static str = "noarch";

    pub fn is_known(&self) -> bool {
        KNOWN_SUBDIRS.contains(&self.as_str())
    }

    /// The subdir matching the platform this binary was compiled for.
    ///
    /// Falls back to `noarch` on targets conda does not publish packages for.
    pub fn host() -> Self {
        let subdir = match (std::env::consts::OS, std::env::consts::ARCH) {
            ("linux", "x86_64") => "linux-64",
            ("linux", "x86") => "linux-32",
            ("linux", "aarch64") => "linux-aarch64",
            ("linux", "arm") => "linux-armv7l",
            ("linux", "powerpc64") => "linux-ppc64le",
            ("linux", "riscv64") => "linux-riscv64",
            ("linux", "s390x") => "linux-s390x",
            ("macos", "x86_64") => "osx-64",
            ("macos", "aarch64") => "osx-arm64",
            ("windows", "x86_64") => "win-64",
            ("windows", "x86") => "win-32",
            ("windows", "aarch64") => "win-arm64",
            ("freebsd", "x86_64") => "freebsd-64",
            _ => Self::NOARCH,
        };
        Self::new(subdir)
    }
}
