// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative macros for reducing boilerplate.
//!
//! - [`wire_label!`] — stable string labels for status-like enums, with
//!   a `Display` that writes them
//! - [`test_builder!`] — fixture builders for the record types tests
//!   construct over and over

/// Give a status-like enum its wire labels.
///
/// Generates `pub fn label(&self) -> &'static str` plus a `Display`
/// backed by it, so log lines, the viewer, and sqlite columns all agree
/// on one spelling per variant. Data-carrying variants use `(..)` to
/// ignore their fields.
///
/// ```ignore
/// crate::wire_label! {
///     SyncStatus {
///         InSync => "in_sync",
///         FailedConflict => "failed_conflict",
///     }
/// }
/// ```
#[macro_export]
macro_rules! wire_label {
    ($enum:ty { $( $variant:ident $(( $($ignore:tt)* ))? => $label:expr ),+ $(,)? }) => {
        impl $enum {
            /// Stable label as it appears on the wire and in logs.
            pub fn label(&self) -> &'static str {
                match self {
                    $( Self::$variant $(( $($ignore)* ))? => $label, )+
                }
            }
        }

        impl std::fmt::Display for $enum {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

/// Generate a fixture builder for tests.
///
/// Everything is gated behind `#[cfg(any(test, feature =
/// "test-support"))]`. Fields come in two groups:
///
/// - `required { field: Type = default }` — present on every built
///   value, seeded with a test default
/// - `optional { field: Type }` — `Option<Type>` on the target,
///   `None` unless set
///
/// All setters accept `impl Into<T>` so fixtures can pass `&str` for
/// `String` fields. Builders start from `Default` and finish with
/// `build()`.
#[macro_export]
macro_rules! test_builder {
    (
        pub struct $builder:ident => $target:ident {
            required {
                $( $req:ident : $req_ty:ty = $req_default:expr ),* $(,)?
            }
            $(optional {
                $( $opt:ident : $opt_ty:ty ),* $(,)?
            })?
        }
    ) => {
        #[cfg(any(test, feature = "test-support"))]
        pub struct $builder {
            $( $req: $req_ty, )*
            $($( $opt: Option<$opt_ty>, )*)?
        }

        #[cfg(any(test, feature = "test-support"))]
        impl Default for $builder {
            fn default() -> Self {
                Self {
                    $( $req: $req_default.into(), )*
                    $($( $opt: None, )*)?
                }
            }
        }

        #[cfg(any(test, feature = "test-support"))]
        impl $builder {
            $(
                pub fn $req(mut self, v: impl Into<$req_ty>) -> Self {
                    self.$req = v.into();
                    self
                }
            )*

            $($(
                pub fn $opt(mut self, v: impl Into<$opt_ty>) -> Self {
                    self.$opt = Some(v.into());
                    self
                }
            )*)?

            pub fn build(self) -> $target {
                $target {
                    $( $req: self.$req, )*
                    $($( $opt: self.$opt, )*)?
                }
            }
        }
    };
}
