//! Plain-text 4×4 matrices: four rows of four whitespace-separated numbers.

use std::fs;
use std::path::Path;
use anyhow::{bail, Context, Result};
use nalgebra::Matrix4;

pub fn format_affine(matrix: &Matrix4<f64>) -> String {
    let mut out = String::new();
    for r in 0..4 {
        let row: Vec<String> = (0..4).map(|c| format!("{}", matrix[(r, c)])).collect();
        out.push_str(&row.join(" "));
        out.push('\n');
    }
    out
}

pub fn parse_affine(text: &str) -> Result<Matrix4<f64>> {
    let values = text
        .split_whitespace()
        .map(|token| {
            token
                .parse::<f64>()
                .with_context(|| format!("Invalid matrix entry '{token}'"))
        })
        .collect::<Result<Vec<f64>>>()?;
    if values.len() != 16 {
        bail!("Expected 16 matrix entries, found {}", values.len());
    }
    Ok(Matrix4::from_row_slice(&values))
}

pub fn write_affine(path: &Path, matrix: &Matrix4<f64>) -> Result<()> {
    fs::write(path, format_affine(matrix))
        .with_context(|| format!("Failed to write affine to {}", path.display()))
}

pub fn read_affine(path: &Path) -> Result<Matrix4<f64>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read affine from {}", path.display()))?;
    parse_affine(&text).with_context(|| format!("Malformed affine in {}", path.display()))
}
