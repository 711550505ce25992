//! Parsing of the free-text equipment list edited alongside a product.
//!
//! One add-on per line, written as `name,extra_price`. Blank lines are
//! ignored. The last comma separates the price, so names may contain commas.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::models::{Equipment, Equipments};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineError {
    pub line: usize,
    pub reason: String,
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.reason)
    }
}

/// Every malformed line of a rejected equipment list, in input order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid equipment list: {}", .lines.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
pub struct EquipmentErrors {
    lines: Vec<LineError>,
}

impl EquipmentErrors {
    pub fn lines(&self) -> &[LineError] {
        &self.lines
    }
}

fn parse_line(line: &str) -> Result<Equipment, String> {
    let (name, price) = line
        .rsplit_once(',')
        .ok_or_else(|| "expected `name,extra_price`".to_string())?;
    let name = name.trim();
    if name.is_empty() {
        return Err("equipment name is empty".to_string());
    }
    let price = price.trim();
    let extra_price = Decimal::from_str(price)
        .map_err(|_| format!("extra price `{}` is not a decimal number", price))?;
    if extra_price.is_sign_negative() {
        return Err(format!("extra price `{}` is negative", price));
    }
    Ok(Equipment {
        name: name.to_string(),
        extra_price,
    })
}

/// Parses the whole list. Nothing is returned unless every line is valid.
pub fn parse_equipments(text: &str) -> Result<Equipments, EquipmentErrors> {
    let mut equipments = Vec::new();
    let mut lines = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        match parse_line(trimmed) {
            Ok(equipment) => equipments.push(equipment),
            Err(reason) => lines.push(LineError {
                line: idx + 1,
                reason,
            }),
        }
    }
    if lines.is_empty() {
        Ok(Equipments(equipments))
    } else {
        Err(EquipmentErrors { lines })
    }
}
