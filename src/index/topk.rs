use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// 带位置的候选项，位置即插入顺序
#[derive(Debug, Clone, Copy)]
pub struct Scored {
    pub similarity: f32,
    pub pos: usize,
}

// 越"差"的候选项越大：相似度低者大，相似度相同时插入晚者大
// 这样 BinaryHeap 的堆顶始终是当前最差的候选项
impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        other.similarity.total_cmp(&self.similarity).then(self.pos.cmp(&other.pos))
    }
}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Scored {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scored {}

/// 容量为 k 的有界堆，保留最好的 k 个候选项
pub struct TopKNeighbors {
    heap: BinaryHeap<Scored>,
    k: usize,
}

impl TopKNeighbors {
    pub fn new(k: usize) -> Self {
        Self { heap: BinaryHeap::with_capacity(k + 1), k }
    }

    #[inline(always)]
    pub fn push(&mut self, item: Scored) {
        if self.k == 0 {
            return;
        }
        if self.heap.len() < self.k {
            self.heap.push(item);
        } else if let Some(mut worst) = self.heap.peek_mut() {
            if item < *worst {
                *worst = item;
            }
        }
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = Scored>) {
        for item in items {
            self.push(item);
        }
    }

    /// 合并另一个堆，用于并行扫描后的归并
    pub fn merge(mut self, other: Self) -> Self {
        self.extend(other.heap);
        self
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// 按相似度降序返回，相似度相同时先插入者在前
    pub fn into_sorted_vec(self) -> Vec<Scored> {
        self.heap.into_sorted_vec()
    }
}
