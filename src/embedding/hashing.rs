//! 해싱 임베딩 - 모델 없이 동작하는 결정적 임베딩
//!
//! 영숫자 단위 토큰을 SHA-256으로 버킷/부호에 매핑한 뒤(feature hashing) L2 정규화합니다.
//! 의미 유사도는 없지만 같은 토큰을 공유하는 텍스트끼리 가깝게 배치됩니다.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::EmbeddingProvider;

/// 해싱 임베딩 프로바이더
#[derive(Debug, Clone)]
pub struct HashingEmbedding {
    dimension: usize,
}

impl HashingEmbedding {
    /// 차원을 지정하여 생성
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            anyhow::bail!("Invalid dimension: 0");
        }
        Ok(Self { dimension })
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        // 구두점은 토큰 경계로 취급 ("erp;" == "erp")
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in vector.iter_mut() {
                *x /= norm;
            }
        }

        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.encode(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::cosine_similarity;

    #[tokio::test]
    async fn test_deterministic() {
        let embedder = HashingEmbedding::new(128).unwrap();
        let a = embedder.embed("το erp συστημα").await.unwrap();
        let b = embedder.embed("το erp συστημα").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 128);
    }

    #[tokio::test]
    async fn test_shared_tokens_are_closer() {
        let embedder = HashingEmbedding::new(256).unwrap();
        let doc = embedder.embed("το erp συστημα").await.unwrap();
        let related = embedder.embed("erp").await.unwrap();
        let unrelated = embedder.embed("λογιστικη μισθοδοσια").await.unwrap();

        assert!(cosine_similarity(&doc, &related) > cosine_similarity(&doc, &unrelated));
    }

    #[tokio::test]
    async fn test_punctuation_is_ignored() {
        let embedder = HashingEmbedding::new(64).unwrap();
        assert_eq!(
            embedder.embed("erp;").await.unwrap(),
            embedder.embed("erp").await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_empty_is_zero_vector() {
        let embedder = HashingEmbedding::new(8).unwrap();
        assert_eq!(embedder.embed("").await.unwrap(), vec![0.0; 8]);
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(HashingEmbedding::new(0).is_err());
    }
}
