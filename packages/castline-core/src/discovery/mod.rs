//! Device discovery.
//!
//! Three scanner families feed the catalog through the same [`DeviceStream`]:
//! - [`SsdpScanner`]: time-boxed M-SEARCH rounds (Roku, Kodi)
//! - [`ServiceAdvertisementScanner`]: continuous service browsing (AirPlay)
//! - [`VendorScanner`]: devices reported by the vendor session SDK (Chromecast)

pub mod description;
pub mod mdns;
pub mod ssdp;
pub mod types;
pub mod vendor;

pub use description::{parse_device_description, DescriptionFetcher, DeviceDescription};
pub use mdns::{
    AdvertisementEvent, AdvertisementSource, MdnsSource, ResolvedAdvertisement,
    ServiceAdvertisementScanner,
};
pub use ssdp::{parse_ssdp_response, SsdpConfig, SsdpReply, SsdpScanner};
pub use types::{DeviceStream, DiscoveryError, DiscoveryResult, ScanEvent};
pub use vendor::{
    UnavailableVendorAdapter, VendorDevice, VendorError, VendorEvent, VendorScanner,
    VendorSessionAdapter,
};
