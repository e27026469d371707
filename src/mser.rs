//! Maximally stable extremal regions.
//!
//! An extremal region is a connected set of pixels that are all darker (or
//! all brighter) than every pixel on its boundary. Sweeping the threshold from
//! 0 to 255 grows these regions into a tree; a region is *maximally stable*
//! when its area barely changes over `delta` threshold steps and changes less
//! than its parent's and children's do.
//!
//! [`MserDetector`] builds that component tree with a union-find over pixels
//! sorted by intensity (4-connectivity), once per polarity.
//!
//! # Example
//!
//! ```
//! use image::{GrayImage, Luma};
//! use scenecard::{MserDetector, MserOptions};
//!
//! let mut gray = GrayImage::from_pixel(100, 100, Luma([0]));
//! for y in 30..70 {
//!     for x in 20..60 {
//!         gray.put_pixel(x, y, Luma([255]));
//!     }
//! }
//!
//! let regions = MserDetector::new(MserOptions::default()).detect(&gray);
//! assert!(regions.iter().any(|region| region.area == 1600));
//! ```

use std::collections::{HashMap, HashSet};

use image::GrayImage;

/// Axis-aligned rectangle in pixel coordinates. `x2` and `y2` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionBox {
    /// Left edge.
    pub x1: u32,
    /// Top edge.
    pub y1: u32,
    /// One past the right edge.
    pub x2: u32,
    /// One past the bottom edge.
    pub y2: u32,
}

impl RegionBox {
    /// Box from origin and size.
    pub fn from_xywh(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x1: x,
            y1: y,
            x2: x + width,
            y2: y + height,
        }
    }

    fn pixel(x: u32, y: u32) -> Self {
        Self::from_xywh(x, y, 1, 1)
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    /// Area in pixels.
    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &RegionBox) -> RegionBox {
        RegionBox {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }
}

/// Which extremum a region is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Polarity {
    /// Darker than its surroundings.
    DarkOnBright,
    /// Brighter than its surroundings.
    BrightOnDark,
}

/// A detected stable region.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Bounding box of the region's pixels.
    pub bounds: RegionBox,
    /// Number of pixels in the region.
    pub area: usize,
    /// Intensity threshold (in the source image) at which it was found.
    pub level: u8,
    /// Which extremum it is.
    pub polarity: Polarity,
    /// Relative area growth over `delta` threshold steps.
    pub variation: f32,
}

/// Tuning parameters for [`MserDetector`].
#[derive(Debug, Clone, PartialEq)]
pub struct MserOptions {
    /// Threshold steps over which stability is measured.
    pub delta: u8,
    /// Smallest region kept, in pixels.
    pub min_area: usize,
    /// Largest region kept, in pixels.
    pub max_area: usize,
    /// Largest relative area growth a stable region may show.
    pub max_variation: f32,
    /// Minimum relative size difference between nested kept regions.
    pub min_diversity: f32,
}

impl Default for MserOptions {
    fn default() -> Self {
        Self {
            delta: 5,
            min_area: 60,
            max_area: 14_400,
            max_variation: 0.25,
            min_diversity: 0.2,
        }
    }
}

impl MserOptions {
    /// Set the smallest region area, in pixels.
    #[must_use]
    pub fn with_min_area(mut self, min_area: usize) -> Self {
        self.min_area = min_area;
        self
    }

    /// Set the largest region area, in pixels.
    #[must_use]
    pub fn with_max_area(mut self, max_area: usize) -> Self {
        self.max_area = max_area;
        self
    }

    /// Set the intensity step over which stability is measured.
    #[must_use]
    pub fn with_delta(mut self, delta: u8) -> Self {
        self.delta = delta;
        self
    }
}

/// Detects maximally stable extremal regions in grayscale rasters.
#[derive(Debug, Clone, Default)]
pub struct MserDetector {
    options: MserOptions,
}

impl MserDetector {
    /// Create a detector with the given options.
    pub fn new(options: MserOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MserOptions {
        &self.options
    }

    /// Regions of both polarities. Dark regions come first, each group in
    /// tree order.
    pub fn detect(&self, gray: &GrayImage) -> Vec<Region> {
        let mut regions = self.detect_polarity(gray, Polarity::DarkOnBright);

        let mut inverted = gray.clone();
        image::imageops::invert(&mut inverted);
        regions.extend(self.detect_polarity(&inverted, Polarity::BrightOnDark));

        regions
    }

    fn detect_polarity(&self, gray: &GrayImage, polarity: Polarity) -> Vec<Region> {
        let nodes = build_component_tree(gray);
        let variations = variations(&nodes, self.options.delta);

        let mut candidates: Vec<usize> = (0..nodes.len())
            .filter(|&index| self.is_stable(&nodes, &variations, index))
            .collect();
        candidates.sort_by(|&a, &b| {
            variations[a]
                .total_cmp(&variations[b])
                .then(nodes[a].area.cmp(&nodes[b].area))
        });

        let mut accepted = HashSet::new();
        let mut blocked = HashSet::new();
        for index in candidates {
            if blocked.contains(&index) {
                continue;
            }
            let similar = self.similar_ancestors(&nodes, index);
            if similar.iter().any(|ancestor| accepted.contains(ancestor)) {
                continue;
            }
            blocked.extend(similar);
            accepted.insert(index);
        }

        let mut accepted: Vec<usize> = accepted.into_iter().collect();
        accepted.sort_unstable();
        accepted
            .into_iter()
            .map(|index| {
                let node = &nodes[index];
                let level = match polarity {
                    Polarity::DarkOnBright => node.level,
                    Polarity::BrightOnDark => 255 - node.level,
                };
                Region {
                    bounds: node.bounds,
                    area: node.area,
                    level,
                    polarity,
                    variation: variations[index],
                }
            })
            .collect()
    }

    fn is_stable(&self, nodes: &[Node], variations: &[f32], index: usize) -> bool {
        let node = &nodes[index];
        let variation = variations[index];
        // The root spans the whole image and has no boundary.
        let Some(parent) = node.parent else {
            return false;
        };
        if node.area < self.options.min_area || node.area > self.options.max_area {
            return false;
        }
        if variation > self.options.max_variation {
            return false;
        }
        variation <= variations[parent]
            && node
                .children
                .iter()
                .all(|&child| variation <= variations[child])
    }

    /// Ancestors too close in size for both to be kept.
    fn similar_ancestors(&self, nodes: &[Node], index: usize) -> Vec<usize> {
        let area = nodes[index].area as f32;
        let mut similar = Vec::new();
        let mut current = nodes[index].parent;
        while let Some(ancestor) = current {
            let ancestor_area = nodes[ancestor].area as f32;
            if (ancestor_area - area) / ancestor_area >= self.options.min_diversity {
                break;
            }
            similar.push(ancestor);
            current = nodes[ancestor].parent;
        }
        similar
    }
}

/// One component of a threshold set.
#[derive(Debug, Clone)]
struct Node {
    level: u8,
    area: usize,
    bounds: RegionBox,
    parent: Option<usize>,
    children: Vec<usize>,
}

struct DisjointSets {
    parent: Vec<usize>,
    rank: Vec<u8>,
    area: Vec<usize>,
    bounds: Vec<RegionBox>,
    active: Vec<bool>,
}

impl DisjointSets {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
            area: vec![0; len],
            bounds: vec![RegionBox::pixel(0, 0); len],
            active: vec![false; len],
        }
    }

    fn activate(&mut self, index: usize, x: u32, y: u32) {
        self.active[index] = true;
        self.area[index] = 1;
        self.bounds[index] = RegionBox::pixel(x, y);
    }

    fn find(&mut self, mut index: usize) -> usize {
        while self.parent[index] != index {
            self.parent[index] = self.parent[self.parent[index]];
            index = self.parent[index];
        }
        index
    }

    /// Merge two roots, returning the surviving root.
    fn union(&mut self, a: usize, b: usize) -> usize {
        let (root, child) = if self.rank[a] >= self.rank[b] {
            (a, b)
        } else {
            (b, a)
        };
        if self.rank[a] == self.rank[b] {
            self.rank[root] += 1;
        }
        self.parent[child] = root;
        self.area[root] += self.area[child];
        self.bounds[root] = self.bounds[root].union(&self.bounds[child]);
        root
    }
}

/// Component tree of the dark-region threshold sets of `gray`.
///
/// Nodes are created in increasing level order, so a parent always has a
/// larger index than its children.
fn build_component_tree(gray: &GrayImage) -> Vec<Node> {
    let width = gray.width() as usize;
    let pixels = gray.as_raw();
    if pixels.is_empty() {
        return Vec::new();
    }

    let mut starts = [0usize; 257];
    for &value in pixels {
        starts[value as usize + 1] += 1;
    }
    for level in 1..starts.len() {
        starts[level] += starts[level - 1];
    }
    let mut order = vec![0usize; pixels.len()];
    let mut next = starts;
    for (index, &value) in pixels.iter().enumerate() {
        order[next[value as usize]] = index;
        next[value as usize] += 1;
    }

    let mut sets = DisjointSets::new(pixels.len());
    let mut node_of: Vec<Option<usize>> = vec![None; pixels.len()];
    let mut pending: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut nodes: Vec<Node> = Vec::new();

    for level in 0..=255u8 {
        let at_level = &order[starts[level as usize]..starts[level as usize + 1]];
        if at_level.is_empty() {
            continue;
        }

        for &index in at_level {
            let (x, y) = (index % width, index / width);
            sets.activate(index, x as u32, y as u32);

            let mut neighbours = [None; 4];
            if x > 0 {
                neighbours[0] = Some(index - 1);
            }
            if x + 1 < width {
                neighbours[1] = Some(index + 1);
            }
            if y > 0 {
                neighbours[2] = Some(index - width);
            }
            if index + width < pixels.len() {
                neighbours[3] = Some(index + width);
            }

            for neighbour in neighbours.into_iter().flatten() {
                if !sets.active[neighbour] {
                    continue;
                }
                let a = sets.find(index);
                let b = sets.find(neighbour);
                if a == b {
                    continue;
                }
                let root = sets.union(a, b);
                let mut children = pending.remove(&a).unwrap_or_default();
                children.extend(pending.remove(&b).unwrap_or_default());
                children.extend(node_of[a].take());
                children.extend(node_of[b].take());
                pending.insert(root, children);
            }
        }

        let mut roots: Vec<usize> = at_level.iter().map(|&index| sets.find(index)).collect();
        roots.sort_unstable();
        roots.dedup();

        for root in roots {
            let id = nodes.len();
            let children = pending.remove(&root).unwrap_or_default();
            for &child in &children {
                nodes[child].parent = Some(id);
            }
            nodes.push(Node {
                level,
                area: sets.area[root],
                bounds: sets.bounds[root],
                parent: None,
                children,
            });
            node_of[root] = Some(id);
        }
    }

    nodes
}

/// `(area(level + delta) - area) / area` for every node.
fn variations(nodes: &[Node], delta: u8) -> Vec<f32> {
    nodes
        .iter()
        .map(|node| {
            let limit = node.level as u16 + delta as u16;
            let mut top = node;
            while let Some(parent) = top.parent {
                if nodes[parent].level as u16 > limit {
                    break;
                }
                top = &nodes[parent];
            }
            (top.area - node.area) as f32 / node.area as f32
        })
        .collect()
}
