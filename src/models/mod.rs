pub mod annotation;
pub mod image_record;
