// 该文件是 Shanan （山南西风） 项目的一部分。
// src/postprocess/nms.rs - 按类别的非极大值抑制
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

use std::collections::BTreeMap;

use tracing::trace;

use crate::model::{BBox, Candidate};

/// 非极大值抑制，各类别相互独立
///
/// 输出按类别号升序排列，类内按分数降序；同分时保留稳定排序中靠前者。
pub fn nms(candidates: Vec<Candidate>, iou_thresh: f32) -> Vec<Candidate> {
  let mut by_class: BTreeMap<u32, Vec<Candidate>> = BTreeMap::new();
  for candidate in candidates {
    by_class
      .entry(candidate.class_id())
      .or_default()
      .push(candidate);
  }

  let mut kept = Vec::new();
  for (class_id, mut group) in by_class {
    // sort_by 是稳定排序
    group.sort_by(|a, b| b.score().total_cmp(&a.score()));

    let total = group.len();
    let mut kept_boxes: Vec<BBox> = Vec::with_capacity(total);
    for candidate in group {
      let bbox = candidate.bbox();
      if kept_boxes.iter().all(|k| k.iou(&bbox) <= iou_thresh) {
        kept_boxes.push(bbox);
        kept.push(candidate);
      }
    }
    trace!("类别 {}: {} -> {}", class_id, total, kept_boxes.len());
  }

  kept
}

#[cfg(test)]
mod tests {
  use super::*;

  fn candidate(cx: f32, cy: f32, size: f32, score: f32, class_id: usize) -> Candidate {
    let mut scores = vec![0.0; 3];
    scores[class_id] = score;
    Candidate::new(cx, cy, size, size, 1.0, scores.into())
  }

  #[test]
  fn duplicate_of_same_class_is_suppressed() {
    // 100x100 与 100x95 同心框, IoU = 0.95
    let strong = candidate(100.0, 100.0, 100.0, 0.9, 0);
    let weak = Candidate::new(100.0, 100.0, 100.0, 95.0, 1.0, vec![0.6, 0.0, 0.0].into());
    assert!(strong.bbox().iou(&weak.bbox()) > 0.9);

    let kept = nms(vec![weak, strong.clone()], 0.45);
    assert_eq!(kept, vec![strong]);
  }

  #[test]
  fn different_classes_never_suppress() {
    let a = candidate(50.0, 50.0, 40.0, 0.9, 0);
    let b = candidate(50.0, 50.0, 40.0, 0.8, 1);
    assert_eq!(a.bbox().iou(&b.bbox()), 1.0);
    let kept = nms(vec![b.clone(), a.clone()], 0.45);
    assert_eq!(kept, vec![a, b]);
  }

  #[test]
  fn low_overlap_boxes_survive() {
    let a = candidate(50.0, 50.0, 40.0, 0.9, 2);
    let b = candidate(80.0, 50.0, 40.0, 0.7, 2);
    // 交 10x40, 并 2800
    assert!(a.bbox().iou(&b.bbox()) < 0.45);
    assert_eq!(nms(vec![a, b], 0.45).len(), 2);
  }

  #[test]
  fn equal_scores_keep_first_encountered() {
    let first = candidate(50.0, 50.0, 40.0, 0.8, 0);
    let second = candidate(52.0, 50.0, 40.0, 0.8, 0);
    let kept = nms(vec![first.clone(), second], 0.45);
    assert_eq!(kept, vec![first]);
  }

  #[test]
  fn output_is_class_major_and_score_descending() {
    let kept = nms(
      vec![
        candidate(10.0, 10.0, 5.0, 0.6, 1),
        candidate(90.0, 90.0, 5.0, 0.7, 0),
        candidate(50.0, 50.0, 5.0, 0.9, 1),
        candidate(30.0, 30.0, 5.0, 0.8, 0),
      ],
      0.45,
    );
    let order: Vec<_> = kept.iter().map(|c| (c.class_id(), c.score())).collect();
    assert_eq!(order, vec![(0, 0.8), (0, 0.7), (1, 0.9), (1, 0.6)]);
  }

  #[test]
  fn running_twice_changes_nothing() {
    let candidates: Vec<_> = (0..40)
      .map(|i| {
        let f = i as f32;
        candidate(
          (f * 13.0) % 200.0,
          (f * 7.0) % 120.0,
          30.0 + (f * 3.0) % 20.0,
          0.5 + (f * 0.013) % 0.5,
          i % 3,
        )
      })
      .collect();
    let once = nms(candidates, 0.45);
    let twice = nms(once.clone(), 0.45);
    assert_eq!(once, twice);
  }

  #[test]
  fn zero_area_boxes_do_not_suppress() {
    let point = candidate(50.0, 50.0, 0.0, 0.9, 0);
    let other = candidate(50.0, 50.0, 0.0, 0.8, 0);
    assert_eq!(nms(vec![point, other], 0.45).len(), 2);
  }
}
