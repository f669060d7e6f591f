use ndarray::prelude::*;
use serde::Serialize;

use crate::cutoff::SimilarityCutoffs;
use crate::db::ReferenceDatabase;
use crate::error::{Error, Result};

/// 单个候选的匹配结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    /// 候选在调用方序列里的下标
    pub candidate_index: usize,
    /// 命中的品牌，未达到阈值时为 None
    pub brand: Option<String>,
    /// 与最相似参考向量的余弦相似度
    pub similarity: f32,
    pub accepted: bool,
}

/// 余弦相似度，零向量按 0 处理
pub fn cosine_similarity(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    let norm = a.dot(&a).sqrt() * b.dot(&b).sqrt();
    if norm == 0.0 {
        return 0.0;
    }
    a.dot(&b) / norm
}

/// 在全库中为单个查询向量寻找最相似的参考向量
///
/// 逐行扫描，保留首个严格最大值，因此并列时数据库迭代序靠前的参考向量胜出。
/// 命中参考向量所属品牌的阈值决定是否接受；维数不一致立即报错，绝不截断补齐。
pub fn match_one(
    candidate_index: usize,
    query: ArrayView1<'_, f32>,
    db: &ReferenceDatabase,
    cutoffs: &SimilarityCutoffs,
) -> Result<Match> {
    if db.is_empty() {
        return Ok(Match { candidate_index, brand: None, similarity: 0.0, accepted: false });
    }
    if query.len() != db.dim() {
        return Err(Error::DimensionMismatch { query: query.len(), database: db.dim() });
    }

    let mut best = f32::NEG_INFINITY;
    let mut best_row = 0;
    for (i, row) in db.features().rows().into_iter().enumerate() {
        let sim = cosine_similarity(query, row);
        if sim > best {
            best = sim;
            best_row = i;
        }
    }

    let brand = &db.brand_map()[best_row];
    // 标定结果里没有的品牌一律拒绝
    let accepted = cutoffs.get(brand).is_some_and(|cutoff| best >= cutoff);
    Ok(Match {
        candidate_index,
        brand: accepted.then(|| brand.clone()),
        similarity: best,
        accepted,
    })
}

/// 对查询矩阵逐行匹配，保持行序，零行输入返回空结果
pub fn match_batch(
    queries: ArrayView2<'_, f32>,
    db: &ReferenceDatabase,
    cutoffs: &SimilarityCutoffs,
) -> Result<Vec<Match>> {
    queries
        .rows()
        .into_iter()
        .enumerate()
        .map(|(i, query)| match_one(i, query, db, cutoffs))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelIdentity, ModelKind};

    fn nike_adidas_db() -> ReferenceDatabase {
        let identity = ModelIdentity::new(ModelKind::InceptionV3, 1).unwrap();
        // v1 = nike, v2 = adidas
        let features = array![[1.0f32, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let brands = vec!["nike".to_owned(), "adidas".to_owned()];
        ReferenceDatabase::new(identity, features, brands, [200, 200, 3]).unwrap()
    }

    fn cutoffs() -> SimilarityCutoffs {
        SimilarityCutoffs::from_cutoffs(vec![
            ("nike".to_owned(), 0.8),
            ("adidas".to_owned(), 0.9),
        ])
    }

    /// 与 v1 相似度 0.85（> 0.8），与 v2 相似度 0.5 -> 命中 nike
    #[test]
    fn accepts_above_brand_cutoff() {
        let db = nike_adidas_db();
        // 与 [1,0,0] 夹角使 cos = 0.85，与 [0,1,0] 的 cos = 0.5
        let query = array![0.85f32, 0.5, (1.0 - 0.85f32 * 0.85 - 0.25).sqrt()];
        let m = match_one(0, query.view(), &db, &cutoffs()).unwrap();
        assert!(m.accepted);
        assert_eq!(m.brand.as_deref(), Some("nike"));
        assert!((m.similarity - 0.85).abs() < 1e-5);
    }

    /// 与 v2 相似度 0.95 >= 0.9 -> 命中 adidas
    #[test]
    fn accepts_exactly_at_or_above_cutoff() {
        let db = nike_adidas_db();
        let query = array![0.0f32, 0.95, (1.0 - 0.95f32 * 0.95).sqrt()];
        let m = match_one(0, query.view(), &db, &cutoffs()).unwrap();
        assert!(m.accepted);
        assert_eq!(m.brand.as_deref(), Some("adidas"));
    }

    /// 与 v2 相似度 0.88（< 0.9），与 v1 相似度 0.3 -> 无命中
    #[test]
    fn rejects_below_every_cutoff() {
        let db = nike_adidas_db();
        let query = array![0.3f32, 0.88, (1.0 - 0.09 - 0.88f32 * 0.88).sqrt()];
        let m = match_one(0, query.view(), &db, &cutoffs()).unwrap();
        assert!(!m.accepted);
        assert_eq!(m.brand, None);
        assert!((m.similarity - 0.88).abs() < 1e-5);
    }

    #[test]
    fn uncalibrated_brand_is_rejected_even_at_full_similarity() {
        let db = nike_adidas_db();
        // nike 不在标定结果里
        let cutoffs = SimilarityCutoffs::from_cutoffs(vec![("adidas".to_owned(), 0.9)]);
        let query = array![1.0f32, 0.0, 0.0];
        let m = match_one(0, query.view(), &db, &cutoffs).unwrap();
        assert!(!m.accepted);
        assert_eq!(m.brand, None);
        assert!((m.similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn tie_break_is_first_in_database_order() {
        let identity = ModelIdentity::new(ModelKind::InceptionV3, 1).unwrap();
        // 两个品牌的参考向量完全相同
        let features = array![[1.0f32, 0.0], [1.0, 0.0]];
        let brands = vec!["first".to_owned(), "second".to_owned()];
        let db = ReferenceDatabase::new(identity, features, brands, [200, 200, 3]).unwrap();
        let cutoffs = SimilarityCutoffs::from_cutoffs(vec![
            ("first".to_owned(), 0.5),
            ("second".to_owned(), 0.5),
        ]);

        let query = array![1.0f32, 0.0];
        for _ in 0..10 {
            let m = match_one(0, query.view(), &db, &cutoffs).unwrap();
            assert_eq!(m.brand.as_deref(), Some("first"));
        }
    }

    #[test]
    fn dimension_mismatch_is_fatal_for_the_query() {
        let db = nike_adidas_db();
        let query = array![1.0f32, 0.0];
        assert!(matches!(
            match_one(0, query.view(), &db, &cutoffs()),
            Err(Error::DimensionMismatch { query: 2, database: 3 })
        ));
    }

    #[test]
    fn zero_row_batch_is_empty_not_an_error() {
        let db = nike_adidas_db();
        let queries = Array2::<f32>::zeros((0, 3));
        let matches = match_batch(queries.view(), &db, &cutoffs()).unwrap();
        assert!(matches.is_empty());
    }

    #[test]
    fn batch_preserves_row_order() {
        let db = nike_adidas_db();
        let queries = array![[0.0f32, 1.0, 0.0], [1.0, 0.0, 0.0]];
        let matches = match_batch(queries.view(), &db, &cutoffs()).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].candidate_index, 0);
        assert_eq!(matches[0].brand.as_deref(), Some("adidas"));
        assert_eq!(matches[1].brand.as_deref(), Some("nike"));
    }

    #[test]
    fn zero_vector_query_matches_nothing() {
        let db = nike_adidas_db();
        let query = array![0.0f32, 0.0, 0.0];
        let m = match_one(0, query.view(), &db, &cutoffs()).unwrap();
        assert!(!m.accepted);
        assert_eq!(m.similarity, 0.0);
    }
}
