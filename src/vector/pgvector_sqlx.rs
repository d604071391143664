// pgvector `vector` type for sqlx binds
// Encodes with the binary protocol; embeddings are never read back from the store

use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo};
use sqlx::{Encode, Postgres, Type};

/// Wrapper type for pgvector's vector type
#[derive(Debug, Clone, PartialEq)]
pub struct PgVector(pub Vec<f32>);

impl PgVector {
    pub fn new(vec: Vec<f32>) -> Self {
        Self(vec)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Binary wire representation:
    /// u16 dimension count, u16 unused, then each component as big-endian f32
    pub fn to_binary(&self) -> Result<Vec<u8>, BoxDynError> {
        let dim = u16::try_from(self.0.len())
            .map_err(|_| format!("vector has {} dimensions, pgvector allows at most {}", self.0.len(), u16::MAX))?;

        let mut bytes = Vec::with_capacity(4 + self.0.len() * 4);
        bytes.extend_from_slice(&dim.to_be_bytes());
        bytes.extend_from_slice(&[0u8, 0u8]);
        for &value in &self.0 {
            bytes.extend_from_slice(&value.to_be_bytes());
        }
        Ok(bytes)
    }
}

impl From<Vec<f32>> for PgVector {
    fn from(vec: Vec<f32>) -> Self {
        Self(vec)
    }
}

impl Type<Postgres> for PgVector {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("vector")
    }
}

impl Encode<'_, Postgres> for PgVector {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        buf.extend_from_slice(&self.to_binary()?);
        Ok(IsNull::No)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_layout() {
        let bytes = PgVector::new(vec![1.0, -2.5]).to_binary().unwrap();
        assert_eq!(&bytes[0..2], &2u16.to_be_bytes());
        assert_eq!(&bytes[2..4], &[0, 0]);
        assert_eq!(&bytes[4..8], &1.0f32.to_be_bytes());
        assert_eq!(&bytes[8..12], &(-2.5f32).to_be_bytes());
    }

    #[test]
    fn test_pgvector_from() {
        let pg_vec = PgVector::from(vec![4.0, 5.0, 6.0]);
        assert_eq!(pg_vec.as_slice(), &[4.0, 5.0, 6.0]);
    }
}
