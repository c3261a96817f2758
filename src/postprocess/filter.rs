// 该文件是 Shanan （山南西风） 项目的一部分。
// src/postprocess/filter.rs - 分数阈值过滤
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use crate::model::Candidate;

/// 保留 `score >= obj_thresh` 的候选框，全部被过滤时返回空序列
pub fn filter(mut candidates: Vec<Candidate>, obj_thresh: f32) -> Vec<Candidate> {
  candidates.retain(|c| c.score() >= obj_thresh);
  candidates
}

#[cfg(test)]
mod tests {
  use super::*;

  fn candidate(objectness: f32, class_conf: f32) -> Candidate {
    Candidate::new(0.0, 0.0, 10.0, 10.0, objectness, vec![class_conf].into())
  }

  #[test]
  fn keeps_scores_at_or_above_threshold() {
    let kept = filter(vec![candidate(1.0, 0.5), candidate(1.0, 0.49), candidate(0.9, 0.9)], 0.5);
    assert_eq!(kept.len(), 2);
    assert!(kept.iter().all(|c| c.score() >= 0.5));
  }

  #[test]
  fn all_below_threshold_is_empty() {
    let kept = filter(vec![candidate(1.0, 0.1); 10], 0.5);
    assert!(kept.is_empty());
  }

  #[test]
  fn raising_threshold_never_adds_candidates() {
    let candidates: Vec<_> = (0..50)
      .map(|i| candidate(1.0, (i as f32 * 0.37) % 1.0))
      .collect();
    let mut previous = usize::MAX;
    for step in 0..=20 {
      let kept = filter(candidates.clone(), step as f32 * 0.05).len();
      assert!(kept <= previous);
      previous = kept;
    }
  }
}
