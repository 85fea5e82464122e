//! DocVault Audit Ledger
//!
//! Append-only, tenant-scoped record of who did what to which resource.
//!
//! # Guarantees
//!
//! - Entries are written under the caller's tenant binding and can only be
//!   read back by that tenant.
//! - There is no update or delete API. Any such statement reaching the
//!   store is refused by the `audit_logs` reject triggers, whatever the
//!   session binding.
//! - Ledger foreign keys are plain, so entries stay recordable after the
//!   tenant or actor is soft-deleted.

pub mod entry;
pub mod ledger;

pub use entry::{AuditLogEntry, AuditRecord, MAX_NETWORK_ADDRESS_LEN};
pub use ledger::{render_csv, AuditFilter, AuditLedger, ExportFormat};
