//! Output functions for consistent CLI formatting

use crate::image::SharedImage;
use console::style;

/// Display a success step
pub fn step_ok(message: &str) {
    println!("  {} {}", style("[OK]").green(), message);
}

/// Display a warning step
pub fn step_warn(message: &str) {
    println!("  {} {}", style("[WARN]").yellow(), message);
}

/// Display an info step
pub fn step_info(message: &str) {
    println!("  {} {}", style("[INFO]").cyan(), message);
}

/// Print styled key-value pair
pub fn key_value(key: &str, value: &str) {
    println!("  {}: {}", style(key).dim(), value);
}

/// Print a listing of shared images as a table
pub fn image_table(images: &[SharedImage]) {
    println!(
        "{:<24} {:<20} {:<34} {:<8} {:<12}",
        "NAME", "BUILD DATE", "BUILD ID", "TYPE", "FILESYSTEM"
    );
    println!("{}", "-".repeat(100));

    for image in images {
        println!(
            "{:<24} {:<20} {:<34} {:<8} {:<12}",
            image.name,
            image.build_date.format("%Y-%m-%d %H:%M:%S"),
            image.build_id,
            image.image_type.to_string(),
            image.file_system.to_string(),
        );
    }

    println!();
    println!("Total: {} image(s)", images.len());
}

/// Print a listing of shared images, names only
pub fn image_plain(images: &[SharedImage]) {
    for image in images {
        println!("{}_{}", image.name, image.build_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{FileSystemType, ImageType};
    use chrono::Utc;

    #[test]
    fn output_does_not_panic() {
        step_ok("done");
        step_warn("careful");
        step_info("note");
        key_value("key", "value");

        let images = vec![SharedImage::new(
            "base",
            Utc::now(),
            "b1",
            ImageType::QCow2,
            FileSystemType::Ext4,
        )];
        image_table(&images);
        image_plain(&images);
    }
}
