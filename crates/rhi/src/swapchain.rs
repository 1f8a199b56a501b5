//! Backend-neutral swapchain description and selection policy.
//!
//! A [`SwapchainDesc`] is what a swapchain factory hands to the frame loop. It
//! carries the surface-dependent choices (format, extent, present mode,
//! composite alpha, transform) and deliberately has no sharing-mode or usage
//! fields: those are fixed by the backend when the swapchain is built.

use ash::vk;
use tracing::{debug, warn};

use crate::error::{RhiError, RhiResult};

/// Surface capabilities, formats and present modes for one device.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Returns true if a swapchain can be created at all.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }

    /// Returns true if the surface currently has a zero-sized extent, as it
    /// does while its window is minimized.
    #[inline]
    pub fn is_minimized(&self) -> bool {
        let extent = self.capabilities.current_extent;
        extent.width == 0 || extent.height == 0
    }
}

/// Parameters for building a swapchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainDesc {
    pub min_image_count: u32,
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub clipped: bool,
}

impl SwapchainDesc {
    /// Picks every surface-dependent parameter from `support`.
    ///
    /// `fallback_extent` is used (clamped to the surface limits) only when the
    /// surface lets the swapchain decide its own size.
    pub fn from_support(
        support: &SwapchainSupportDetails,
        fallback_extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        if !support.is_adequate() {
            return Err(RhiError::Swapchain(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&support.formats);
        Ok(Self {
            min_image_count: determine_image_count(&support.capabilities),
            format: surface_format.format,
            color_space: surface_format.color_space,
            extent: choose_extent(
                &support.capabilities,
                fallback_extent.width,
                fallback_extent.height,
            ),
            present_mode: choose_present_mode(&support.present_modes),
            composite_alpha: choose_composite_alpha(&support.capabilities),
            pre_transform: support.capabilities.current_transform,
            clipped: true,
        })
    }
}

/// Prefers B8G8R8A8_SRGB, then B8G8R8A8_UNORM, then whatever comes first.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let preferred = formats.iter().find(|f| {
        f.format == vk::Format::B8G8R8A8_SRGB && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    });
    if let Some(&format) = preferred {
        return format;
    }

    let alternative = formats.iter().find(|f| {
        f.format == vk::Format::B8G8R8A8_UNORM && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    });
    if let Some(&format) = alternative {
        debug!("Using fallback surface format: B8G8R8A8_UNORM with SRGB_NONLINEAR");
        return format;
    }

    match formats.first() {
        Some(&format) => {
            warn!("Using first available surface format: {:?}", format.format);
            format
        }
        None => vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        },
    }
}

/// Low-latency non-blocking MAILBOX, then IMMEDIATE, then the always-available FIFO.
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| present_modes.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// First supported composite alpha mode, in OPAQUE, PRE_MULTIPLIED,
/// POST_MULTIPLIED, INHERIT order.
pub fn choose_composite_alpha(
    capabilities: &vk::SurfaceCapabilitiesKHR,
) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::INHERIT,
    ]
    .into_iter()
    .find(|flag| capabilities.supported_composite_alpha.contains(*flag))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

/// The surface's current extent, or the requested size clamped to its limits
/// when the surface leaves the choice to the swapchain.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One image above the minimum, capped by the maximum (0 means unbounded).
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn support(present_modes: Vec<vk::PresentModeKHR>) -> SwapchainSupportDetails {
        SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 4,
                current_extent: vk::Extent2D {
                    width: 640,
                    height: 480,
                },
                current_transform: vk::SurfaceTransformFlagsKHR::ROTATE_90,
                supported_composite_alpha: vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED
                    | vk::CompositeAlphaFlagsKHR::INHERIT,
                ..Default::default()
            },
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes,
        }
    }

    #[test]
    fn test_choose_surface_format_prefers_srgb() {
        let formats = vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::B8G8R8A8_SRGB
        );
    }

    #[test]
    fn test_choose_surface_format_takes_first_otherwise() {
        let formats = vec![vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::R8G8B8A8_UNORM
        );
    }

    #[test]
    fn test_present_mode_order() {
        let all = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(choose_present_mode(&all), vk::PresentModeKHR::MAILBOX);
        assert_eq!(
            choose_present_mode(&all[..2]),
            vk::PresentModeKHR::IMMEDIATE
        );
        assert_eq!(choose_present_mode(&all[..1]), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_composite_alpha_first_supported() {
        let caps = support(vec![]).capabilities;
        assert_eq!(
            choose_composite_alpha(&caps),
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED
        );
    }

    #[test]
    fn test_choose_extent_clamps_when_undefined() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        };
        assert_eq!(
            choose_extent(&capabilities, 3000, 50),
            vk::Extent2D {
                width: 2000,
                height: 100
            }
        );
    }

    #[test]
    fn test_determine_image_count() {
        let capped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capped), 2);

        let unbounded = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&unbounded), 3);
    }

    #[test]
    fn test_desc_from_support() {
        let desc = SwapchainDesc::from_support(
            &support(vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE]),
            vk::Extent2D {
                width: 1,
                height: 1,
            },
        )
        .unwrap();
        assert_eq!(desc.min_image_count, 3);
        assert_eq!(desc.extent.width, 640);
        assert_eq!(desc.present_mode, vk::PresentModeKHR::IMMEDIATE);
        assert_eq!(desc.pre_transform, vk::SurfaceTransformFlagsKHR::ROTATE_90);
        assert_eq!(
            desc.composite_alpha,
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED
        );
    }

    #[test]
    fn test_desc_rejects_inadequate_support() {
        let result = SwapchainDesc::from_support(&support(vec![]), vk::Extent2D::default());
        assert!(matches!(result, Err(RhiError::Swapchain(_))));
    }

    #[test]
    fn test_minimized() {
        let mut details = support(vec![vk::PresentModeKHR::FIFO]);
        assert!(!details.is_minimized());
        details.capabilities.current_extent.height = 0;
        assert!(details.is_minimized());
    }
}
