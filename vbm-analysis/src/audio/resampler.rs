//! Mono resampling with rubato

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;

use super::IngestError;

/// Resample a mono buffer; returns a copy when the rates already match
pub fn resample_mono(input: &[f32], input_rate: u32, output_rate: u32) -> Result<Vec<f32>, IngestError> {
    if input_rate == output_rate || input.is_empty() {
        return Ok(input.to_vec());
    }
    if input_rate == 0 || output_rate == 0 {
        return Err(IngestError::Resample(format!(
            "invalid rates {} -> {}",
            input_rate, output_rate
        )));
    }

    debug!(from = input_rate, to = output_rate, frames = input.len(), "Resampling recording");

    let mut resampler = FastFixedIn::<f32>::new(
        output_rate as f64 / input_rate as f64,
        1.0,
        PolynomialDegree::Septic,
        input.len(),
        1,
    )
    .map_err(|e| IngestError::Resample(format!("Failed to create resampler: {}", e)))?;

    let planar = vec![input.to_vec()];
    let mut output = resampler
        .process(&planar, None)
        .map_err(|e| IngestError::Resample(format!("Resampling failed: {}", e)))?;

    Ok(output.pop().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_rate_is_copy() {
        let input = vec![0.1, 0.2, 0.3];
        assert_eq!(resample_mono(&input, 16_000, 16_000).unwrap(), input);
    }

    #[test]
    fn test_downsample_length() {
        let input = vec![0.25f32; 22_050];
        let output = resample_mono(&input, 22_050, 16_000).unwrap();
        let expected = 16_000.0;
        assert!(
            (output.len() as f64 - expected).abs() / expected < 0.02,
            "got {} samples",
            output.len()
        );
    }

    #[test]
    fn test_zero_rate_rejected() {
        assert!(resample_mono(&[0.1; 10], 0, 16_000).is_err());
    }
}
