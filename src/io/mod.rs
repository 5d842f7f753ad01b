mod events;
mod features;
mod geotiff;

pub use events::{EventReader, parse_year};
pub use features::{
    output_path_for_region, parse_feature_collection, read_feature_collection,
    write_feature_collection,
};
pub use geotiff::read_geotiff;
#[cfg(test)]
pub(crate) use geotiff::write_test_geotiff;
