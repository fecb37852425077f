//! Owns the chunked row storage for one archetype: a region request/commit/
//! abort protocol over a recycled-row stack plus a chunk list that grows at
//! the front.

use smallvec::SmallVec;
use std::alloc::{alloc, dealloc, handle_alloc_error, Layout as AllocLayout};
use std::ptr::NonNull;

/// Fixed chunk size.
pub const CHUNK_BYTE_SIZE: usize = 16 * 1024;

struct Chunk {
    /// `None` only for the virtual chunk backing a zero-sized family; its
    /// row pointers are never dereferenced.
    ptr: Option<NonNull<u8>>,
    capacity: usize,
    /// High-water mark of rows ever appended to this chunk, counted from
    /// offset 0. Never shrinks; a despawned row becomes a hole tracked by
    /// the recycled stack, not a reduction of `count`.
    count: usize,
}

impl Chunk {
    fn layout(capacity: usize, family_size: usize, family_align: usize) -> AllocLayout {
        AllocLayout::from_size_align(capacity * family_size, family_align)
            .expect("archetype row layout overflowed")
    }
}

enum RegionSource {
    /// Drawn from the recycled-row stack; not yet removed from it (removal
    /// happens at `commit`, via `new_recycled_count`).
    Recycled,
    /// Freshly carved from a chunk; `count` has already been advanced for
    /// these rows.
    Chunk,
}

/// One contiguous (or single-row, for recycled draws) span of free rows.
pub struct Region {
    pub ptr: NonNull<u8>,
    pub row_count: usize,
    source: RegionSource,
}

/// The outcome of [`ArchetypeStorage::request_regions`]: a set of regions
/// covering exactly the requested row count, plus enough bookkeeping to
/// either `commit` or `abort` the reservation.
pub struct RegionRequest {
    pub regions: SmallVec<[Region; 4]>,
    new_recycled_count: usize,
}

impl RegionRequest {
    pub fn total_rows(&self) -> usize {
        self.regions.iter().map(|r| r.row_count).sum()
    }

    /// Every row pointer covered by this request, in region order. Used by
    /// `World::spawn` to zero-fill each row and to assign entity locations.
    pub fn row_pointers(&self, family_size: usize) -> impl Iterator<Item = NonNull<u8>> + '_ {
        self.regions.iter().flat_map(move |region| {
            (0..region.row_count).map(move |i| {
                if family_size == 0 {
                    region.ptr
                } else {
                    unsafe { NonNull::new_unchecked(region.ptr.as_ptr().add(i * family_size)) }
                }
            })
        })
    }
}

/// Owns the chunks of one archetype: a free-row stack and a chunk list that
/// grows at the front (newest chunk first).
pub struct ArchetypeStorage {
    family_size: usize,
    family_align: usize,
    chunks: Vec<Chunk>,
    recycled: Vec<NonNull<u8>>,
}

impl ArchetypeStorage {
    pub fn new(family_size: usize, family_align: usize) -> Self {
        ArchetypeStorage {
            family_size,
            family_align: family_align.max(1),
            chunks: Vec::new(),
            recycled: Vec::new(),
        }
    }

    pub fn family_size(&self) -> usize {
        self.family_size
    }

    /// Rows per chunk: `floor(CHUNK_BYTE_SIZE / family_size)`.
    pub fn chunk_row_capacity(&self) -> usize {
        if self.family_size == 0 {
            usize::MAX
        } else {
            CHUNK_BYTE_SIZE / self.family_size
        }
    }

    /// Chunks in iteration order: newest (head) first, since new chunks are
    /// prepended.
    pub fn iter_chunks(&self) -> impl Iterator<Item = (NonNull<u8>, usize)> + '_ {
        self.chunks
            .iter()
            .map(|c| (c.ptr.unwrap_or_else(NonNull::dangling), c.count))
    }

    /// Phase 1: reserve `needed` rows, drawing first from the recycled-row
    /// stack (LIFO), then from the head chunk, allocating new chunks at the
    /// front as required.
    pub fn request_regions(&mut self, needed: usize) -> RegionRequest {
        if self.family_size == 0 {
            return self.request_virtual_regions(needed);
        }

        let mut regions = SmallVec::new();
        let mut needed = needed;

        let stack_len = self.recycled.len();
        let take = needed.min(stack_len);
        for i in 0..take {
            let ptr = self.recycled[stack_len - 1 - i];
            regions.push(Region {
                ptr,
                row_count: 1,
                source: RegionSource::Recycled,
            });
        }
        needed -= take;
        let new_recycled_count = stack_len - take;

        while needed > 0 {
            if self.chunks.is_empty() || self.chunks[0].count == self.chunks[0].capacity {
                self.alloc_chunk();
            }

            let head = &mut self.chunks[0];
            let row_offset = head.count;
            let available = head.capacity - head.count;
            let take_here = available.min(needed);

            let ptr = unsafe {
                NonNull::new_unchecked(
                    head.ptr
                        .expect("non-virtual chunk always has a real pointer")
                        .as_ptr()
                        .add(row_offset * self.family_size),
                )
            };

            head.count += take_here;
            regions.push(Region {
                ptr,
                row_count: take_here,
                source: RegionSource::Chunk,
            });

            needed -= take_here;
        }

        log::trace!(
            "reserved {} rows across {} regions ({} from recycled stack)",
            regions.iter().map(|r| r.row_count).sum::<usize>(),
            regions.len(),
            take,
        );

        RegionRequest {
            regions,
            new_recycled_count,
        }
    }

    fn request_virtual_regions(&mut self, needed: usize) -> RegionRequest {
        // A single virtual chunk of null pointer and `count = needed` is
        // prepended, covering the entire request. Its row pointers exist
        // only so systems run once per row; they are never dereferenced.
        self.chunks.insert(
            0,
            Chunk {
                ptr: None,
                capacity: needed,
                count: needed,
            },
        );

        let mut regions = SmallVec::new();
        regions.push(Region {
            ptr: NonNull::dangling(),
            row_count: needed,
            source: RegionSource::Chunk,
        });

        RegionRequest {
            regions,
            new_recycled_count: self.recycled.len(),
        }
    }

    /// Phase 2 (commit): truncate the recycled stack to the size recorded
    /// during `request_regions`. Freshly carved regions already had their
    /// chunk's `count` advanced, so nothing else is needed.
    pub fn commit(&mut self, request: RegionRequest) {
        self.recycled.truncate(request.new_recycled_count);
    }

    /// Phase 2 (abort): every region reserved by `request_regions` becomes
    /// free again. Recycled-origin regions were never removed from the
    /// stack, so only freshly carved regions need to be pushed back, one
    /// row at a time, so the bytes remain valid free slots.
    pub fn abort(&mut self, request: RegionRequest) {
        if self.family_size == 0 {
            // The virtual chunk `request_virtual_regions` prepended covers
            // the whole request and has no real rows to recycle; drop it
            // instead of pushing dangling pointers onto the recycled stack.
            self.chunks.remove(0);
            return;
        }

        for region in request.regions {
            if let RegionSource::Chunk = region.source {
                for i in 0..region.row_count {
                    let row_ptr =
                        unsafe { NonNull::new_unchecked(region.ptr.as_ptr().add(i * self.family_size)) };
                    self.push_recycled(row_ptr);
                }
            }
        }
    }

    /// Pushes a single freed row back onto the recycled stack (used by
    /// `World::despawn` and by `abort`). Leaks the row on allocation
    /// failure rather than fail the caller.
    pub fn recycle_row(&mut self, ptr: NonNull<u8>) {
        self.push_recycled(ptr);
    }

    fn push_recycled(&mut self, ptr: NonNull<u8>) {
        if self.recycled.try_reserve(1).is_ok() {
            self.recycled.push(ptr);
        } else {
            log::warn!("failed to grow recycled-row stack, leaking a row");
        }
    }

    fn alloc_chunk(&mut self) {
        debug_assert_ne!(self.family_size, 0);

        let capacity = self.chunk_row_capacity();
        let layout = Chunk::layout(capacity, self.family_size, self.family_align);

        let raw = unsafe { alloc(layout) };
        let ptr = match NonNull::new(raw) {
            Some(ptr) => ptr,
            None => handle_alloc_error(layout),
        };

        log::trace!(
            "allocated chunk: {} rows, {} bytes",
            capacity,
            layout.size()
        );

        self.chunks.insert(
            0,
            Chunk {
                ptr: Some(ptr),
                capacity,
                count: 0,
            },
        );
    }
}

impl Drop for ArchetypeStorage {
    fn drop(&mut self) {
        for chunk in &self.chunks {
            if let Some(ptr) = chunk.ptr {
                let layout = Chunk::layout(chunk.capacity, self.family_size, self.family_align);
                unsafe { dealloc(ptr.as_ptr(), layout) };
            }
        }
    }
}
