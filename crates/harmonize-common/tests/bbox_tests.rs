//! Tests for BoundingBox operations used by region validation and grid building.

use harmonize_common::bbox::{BboxParseError, BoundingBox};

// ============================================================================
// Constructor tests
// ============================================================================

#[test]
fn test_bbox_new() {
    let bbox = BoundingBox::new(-180.0, -90.0, 180.0, 90.0);
    assert_eq!(bbox.west, -180.0);
    assert_eq!(bbox.south, -90.0);
    assert_eq!(bbox.east, 180.0);
    assert_eq!(bbox.north, 90.0);
    assert!(bbox.within_world());
}

#[test]
fn test_bbox_from_tuple() {
    let bbox = BoundingBox::from_tuple((-10.0, -5.0, 10.0, 5.0));
    assert_eq!(bbox, BoundingBox::new(-10.0, -5.0, 10.0, 5.0));
    assert!((bbox.area_deg2() - 200.0).abs() < 1e-9);
}

// ============================================================================
// Parsing
// ============================================================================

#[test]
fn test_parse_bounds_wrong_arity() {
    let result = BoundingBox::from_str_list("1,2,3");
    assert!(matches!(result, Err(BboxParseError::InvalidFormat(_))));
}

#[test]
fn test_parse_bounds_bad_number() {
    let result = BoundingBox::from_str_list("1,2,east,4");
    assert!(matches!(result, Err(BboxParseError::InvalidNumber(_))));
}

// ============================================================================
// Shape checks
// ============================================================================

#[test]
fn test_inverted_bounds_not_well_formed() {
    assert!(!BoundingBox::new(10.0, -5.0, -10.0, 5.0).is_well_formed());
    assert!(!BoundingBox::new(-10.0, 5.0, 10.0, -5.0).is_well_formed());
    assert!(!BoundingBox::new(0.0, 0.0, 0.0, 1.0).is_well_formed());
    assert!(BoundingBox::new(-10.0, -5.0, 10.0, 5.0).is_well_formed());
}

#[test]
fn test_non_finite_bounds_not_well_formed() {
    assert!(!BoundingBox::new(f64::NAN, 0.0, 1.0, 1.0).is_well_formed());
    assert!(!BoundingBox::new(0.0, 0.0, f64::INFINITY, 1.0).is_well_formed());
}

#[test]
fn test_out_of_world() {
    assert!(!BoundingBox::new(-190.0, 0.0, 10.0, 5.0).within_world());
    assert!(!BoundingBox::new(0.0, -91.0, 10.0, 5.0).within_world());
}

// ============================================================================
// Union
// ============================================================================

#[test]
fn test_union_all() {
    let boxes = vec![
        BoundingBox::new(0.0, 0.0, 1.0, 1.0),
        BoundingBox::new(-2.0, 0.5, 0.5, 3.0),
        BoundingBox::new(0.2, -1.0, 4.0, 0.8),
    ];
    let union = BoundingBox::union_all(&boxes).unwrap();
    assert_eq!(union, BoundingBox::new(-2.0, -1.0, 4.0, 3.0));
    assert!(BoundingBox::union_all(Vec::<BoundingBox>::new().iter()).is_none());
}
