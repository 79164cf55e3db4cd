mod bounds;

pub use bounds::AABB;
