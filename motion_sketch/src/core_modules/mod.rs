pub mod frame_differ;
pub mod geometry;
pub mod motion_node;
pub mod node_pool;
pub mod node_set;
pub mod pixel_buffer;
pub mod spatial_index;
