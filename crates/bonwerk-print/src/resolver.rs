// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Map a user-supplied printer identifier onto a descriptor.

use bonwerk_core::error::{BonwerkError, Result};
use bonwerk_core::types::PrinterDescriptor;

/// Find the printer `identifier` refers to.
///
/// Tried in order, each over the whole list, first hit wins:
/// exact id, exact name, exact address, then substring of id or name.
/// All comparisons ignore case.  A missing or blank identifier picks the
/// first online printer.
pub fn resolve<'a>(
    printers: &'a [PrinterDescriptor],
    identifier: Option<&str>,
) -> Result<&'a PrinterDescriptor> {
    let wanted = identifier.map(str::trim).unwrap_or_default();
    if wanted.is_empty() {
        return printers
            .iter()
            .find(|p| p.is_online())
            .ok_or(BonwerkError::NoOnlinePrinter);
    }

    let wanted = wanted.to_lowercase();
    let exact = |field: fn(&PrinterDescriptor) -> &str| {
        printers.iter().find(|p| field(p).to_lowercase() == wanted)
    };

    exact(|p| p.id.as_str())
        .or_else(|| exact(|p| p.name.as_str()))
        .or_else(|| exact(|p| p.address.as_str()))
        .or_else(|| {
            printers.iter().find(|p| {
                p.id.to_lowercase().contains(&wanted) || p.name.to_lowercase().contains(&wanted)
            })
        })
        .ok_or_else(|| BonwerkError::PrinterNotFound(identifier.unwrap_or_default().trim().to_owned()))
}
