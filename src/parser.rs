//! URDF XML parser.
//!
//! Parses URDF XML into the intermediate representation types. Numbers are
//! parsed permissively (malformed values become `NaN`); only structural
//! problems such as a missing `<robot>` root or a joint without a parent
//! fail the parse.

use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{Result, UrdfError};
use crate::joint::{JointLimit, JointType};
use crate::rotation::{parse_number, parse_tuple};
use crate::types::{
    UrdfCollision, UrdfGeometry, UrdfInertia, UrdfInertial, UrdfJoint, UrdfLink, UrdfMaterial,
    UrdfMimic, UrdfOrigin, UrdfRobot, UrdfVisual,
};

/// Parse a URDF string into a robot description.
///
/// # Errors
///
/// Returns an error if the XML is malformed, has no `<robot>` element, or
/// is missing required elements.
pub fn parse_urdf_str(xml: &str) -> Result<UrdfRobot> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    parse_urdf_reader(&mut reader)
}

/// Parse URDF from a reader. The first `<robot>` element wins.
fn parse_urdf_reader<R: BufRead>(reader: &mut Reader<R>) -> Result<UrdfRobot> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"robot" => {
                return parse_robot(reader, e);
            }
            Ok(Event::Empty(ref e)) if e.name().as_ref() == b"robot" => {
                return Ok(UrdfRobot::new(get_attribute_opt(e, "name").unwrap_or_default()));
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(UrdfError::XmlParse(e.to_string())),
        }
        buf.clear();
    }

    Err(UrdfError::MalformedDocument("no <robot> element found".into()))
}

/// Parse the robot element and its children.
fn parse_robot<R: BufRead>(reader: &mut Reader<R>, start: &BytesStart) -> Result<UrdfRobot> {
    let name = get_attribute_opt(start, "name").unwrap_or_default();
    let mut robot = UrdfRobot::new(name);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let elem_name = e.name().as_ref().to_vec();
                match elem_name.as_slice() {
                    b"link" => {
                        let link = parse_link(reader, e)?;
                        robot.links.push(link);
                    }
                    b"joint" => {
                        let joint = parse_joint(reader, e)?;
                        robot.joints.push(joint);
                    }
                    b"material" => {
                        let material = parse_material(reader, e, false)?;
                        robot.materials.push(material);
                    }
                    // Skip gazebo, transmission, and other elements
                    _ => skip_element(reader, &elem_name)?,
                }
            }
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"link" => {
                    // Empty link (just a name, no inertial/visual/collision)
                    let name = get_attribute(e, "name")?;
                    robot.links.push(UrdfLink::new(name));
                }
                b"joint" => {
                    let name = get_attribute(e, "name")?;
                    return Err(UrdfError::missing_element("parent", format!("joint '{name}'")));
                }
                b"material" => robot.materials.push(parse_material(reader, e, true)?),
                _ => {}
            },
            Ok(Event::End(ref e)) if e.name().as_ref() == b"robot" => break,
            Ok(Event::Eof) => return Err(UrdfError::XmlParse("unexpected EOF in robot".into())),
            Ok(_) => {}
            Err(e) => return Err(UrdfError::XmlParse(e.to_string())),
        }
        buf.clear();
    }

    Ok(robot)
}

/// Parse a link element.
fn parse_link<R: BufRead>(reader: &mut Reader<R>, start: &BytesStart) -> Result<UrdfLink> {
    let name = get_attribute(start, "name")?;
    let mut link = UrdfLink::new(name);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let elem_name = e.name().as_ref().to_vec();
                match elem_name.as_slice() {
                    b"inertial" => link.inertial = Some(parse_inertial(reader)?),
                    b"visual" => link.visuals.push(parse_visual(reader, e)?),
                    b"collision" => link.collisions.push(parse_collision(reader, e)?),
                    _ => skip_element(reader, &elem_name)?,
                }
            }
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"inertial" => link.inertial = Some(UrdfInertial::default()),
                b"visual" => link.visuals.push(UrdfVisual {
                    name: get_attribute_opt(e, "name"),
                    ..Default::default()
                }),
                b"collision" => link.collisions.push(UrdfCollision {
                    name: get_attribute_opt(e, "name"),
                    ..Default::default()
                }),
                _ => {}
            },
            Ok(Event::End(ref e)) if e.name().as_ref() == b"link" => break,
            Ok(Event::Eof) => return Err(UrdfError::XmlParse("unexpected EOF in link".into())),
            Ok(_) => {}
            Err(e) => return Err(UrdfError::XmlParse(e.to_string())),
        }
        buf.clear();
    }

    Ok(link)
}

/// Parse an inertial element.
fn parse_inertial<R: BufRead>(reader: &mut Reader<R>) -> Result<UrdfInertial> {
    let mut inertial = UrdfInertial::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                apply_inertial_child(&mut inertial, e);
                skip_element(reader, e.name().as_ref())?;
            }
            Ok(Event::Empty(ref e)) => apply_inertial_child(&mut inertial, e),
            Ok(Event::End(ref e)) if e.name().as_ref() == b"inertial" => break,
            Ok(Event::Eof) => return Err(UrdfError::XmlParse("unexpected EOF in inertial".into())),
            Ok(_) => {}
            Err(e) => return Err(UrdfError::XmlParse(e.to_string())),
        }
        buf.clear();
    }

    Ok(inertial)
}

fn apply_inertial_child(inertial: &mut UrdfInertial, e: &BytesStart) {
    match e.name().as_ref() {
        b"origin" => inertial.origin = parse_origin(e),
        b"mass" => inertial.mass = parse_float_attr(e, "value").unwrap_or(0.0),
        b"inertia" => inertial.inertia = parse_inertia_element(e),
        _ => {}
    }
}

/// Parse origin element attributes. Missing attributes read as zeros.
fn parse_origin(e: &BytesStart) -> UrdfOrigin {
    let xyz = parse_tuple(get_attribute_opt(e, "xyz").as_deref());
    let rpy = parse_tuple(get_attribute_opt(e, "rpy").as_deref());
    UrdfOrigin::new(xyz, rpy)
}

/// Parse inertia element attributes.
fn parse_inertia_element(e: &BytesStart) -> UrdfInertia {
    UrdfInertia {
        ixx: parse_float_attr(e, "ixx").unwrap_or(0.0),
        ixy: parse_float_attr(e, "ixy").unwrap_or(0.0),
        ixz: parse_float_attr(e, "ixz").unwrap_or(0.0),
        iyy: parse_float_attr(e, "iyy").unwrap_or(0.0),
        iyz: parse_float_attr(e, "iyz").unwrap_or(0.0),
        izz: parse_float_attr(e, "izz").unwrap_or(0.0),
    }
}

/// Parse a material element, top-level or inside a visual.
fn parse_material<R: BufRead>(
    reader: &mut Reader<R>,
    start: &BytesStart,
    empty: bool,
) -> Result<UrdfMaterial> {
    let mut material = UrdfMaterial {
        name: get_attribute_opt(start, "name"),
        ..Default::default()
    };
    if empty {
        return Ok(material);
    }

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                apply_material_child(&mut material, e);
                skip_element(reader, e.name().as_ref())?;
            }
            Ok(Event::Empty(ref e)) => apply_material_child(&mut material, e),
            Ok(Event::End(ref e)) if e.name().as_ref() == b"material" => break,
            Ok(Event::Eof) => return Err(UrdfError::XmlParse("unexpected EOF in material".into())),
            Ok(_) => {}
            Err(e) => return Err(UrdfError::XmlParse(e.to_string())),
        }
        buf.clear();
    }

    Ok(material)
}

fn apply_material_child(material: &mut UrdfMaterial, e: &BytesStart) {
    match e.name().as_ref() {
        b"color" => material.rgba = Some(parse_rgba(get_attribute_opt(e, "rgba").as_deref())),
        b"texture" => material.texture = get_attribute_opt(e, "filename"),
        _ => {}
    }
}

/// Parse an `rgba` attribute. Absent components read as `NaN`, a missing
/// attribute as opaque black.
fn parse_rgba(text: Option<&str>) -> [f64; 4] {
    let Some(text) = text else {
        return [0.0, 0.0, 0.0, 1.0];
    };
    let mut tokens = text.split_whitespace().map(parse_number);
    let mut rgba = [f64::NAN; 4];
    for slot in &mut rgba {
        if let Some(v) = tokens.next() {
            *slot = v;
        }
    }
    rgba
}

/// Parse a visual element.
fn parse_visual<R: BufRead>(reader: &mut Reader<R>, start: &BytesStart) -> Result<UrdfVisual> {
    let mut visual = UrdfVisual {
        name: get_attribute_opt(start, "name"),
        ..Default::default()
    };
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let elem_name = e.name().as_ref().to_vec();
                match elem_name.as_slice() {
                    b"geometry" => visual.geometry = parse_geometry(reader)?,
                    b"material" => visual.material = Some(parse_material(reader, e, false)?),
                    b"origin" => {
                        visual.origin = parse_origin(e);
                        skip_element(reader, &elem_name)?;
                    }
                    _ => skip_element(reader, &elem_name)?,
                }
            }
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"origin" => visual.origin = parse_origin(e),
                b"material" => visual.material = Some(parse_material(reader, e, true)?),
                _ => {}
            },
            Ok(Event::End(ref e)) if e.name().as_ref() == b"visual" => break,
            Ok(Event::Eof) => return Err(UrdfError::XmlParse("unexpected EOF in visual".into())),
            Ok(_) => {}
            Err(e) => return Err(UrdfError::XmlParse(e.to_string())),
        }
        buf.clear();
    }

    Ok(visual)
}

/// Parse a collision element.
fn parse_collision<R: BufRead>(
    reader: &mut Reader<R>,
    start: &BytesStart,
) -> Result<UrdfCollision> {
    let mut collision = UrdfCollision {
        name: get_attribute_opt(start, "name"),
        ..Default::default()
    };
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let elem_name = e.name().as_ref().to_vec();
                match elem_name.as_slice() {
                    b"geometry" => collision.geometry = parse_geometry(reader)?,
                    b"origin" => {
                        collision.origin = parse_origin(e);
                        skip_element(reader, &elem_name)?;
                    }
                    _ => skip_element(reader, &elem_name)?,
                }
            }
            Ok(Event::Empty(ref e)) if e.name().as_ref() == b"origin" => {
                collision.origin = parse_origin(e);
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"collision" => break,
            Ok(Event::Eof) => {
                return Err(UrdfError::XmlParse("unexpected EOF in collision".into()));
            }
            Ok(_) => {}
            Err(e) => return Err(UrdfError::XmlParse(e.to_string())),
        }
        buf.clear();
    }

    Ok(collision)
}

/// Parse a geometry element. The first recognized shape wins.
fn parse_geometry<R: BufRead>(reader: &mut Reader<R>) -> Result<Option<UrdfGeometry>> {
    let mut buf = Vec::new();
    let mut geometry: Option<UrdfGeometry> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                if geometry.is_none() {
                    geometry = parse_shape(e);
                }
                skip_element(reader, e.name().as_ref())?;
            }
            Ok(Event::Empty(ref e)) => {
                if geometry.is_none() {
                    geometry = parse_shape(e);
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"geometry" => break,
            Ok(Event::Eof) => return Err(UrdfError::XmlParse("unexpected EOF in geometry".into())),
            Ok(_) => {}
            Err(e) => return Err(UrdfError::XmlParse(e.to_string())),
        }
        buf.clear();
    }

    Ok(geometry)
}

fn parse_shape(e: &BytesStart) -> Option<UrdfGeometry> {
    match e.name().as_ref() {
        b"box" => Some(UrdfGeometry::Box {
            size: parse_tuple(get_attribute_opt(e, "size").as_deref()),
        }),
        b"cylinder" => Some(UrdfGeometry::Cylinder {
            radius: parse_float_attr(e, "radius").unwrap_or(f64::NAN),
            length: parse_float_attr(e, "length").unwrap_or(f64::NAN),
        }),
        b"sphere" => Some(UrdfGeometry::Sphere {
            radius: parse_float_attr(e, "radius").unwrap_or(f64::NAN),
        }),
        b"mesh" => {
            let Some(filename) = get_attribute_opt(e, "filename") else {
                tracing::warn!("Ignoring mesh without a filename");
                return None;
            };
            let scale = get_attribute_opt(e, "scale").map(|s| parse_tuple(Some(s.as_str())));
            Some(UrdfGeometry::Mesh { filename, scale })
        }
        other => {
            tracing::warn!(
                "Ignoring unsupported geometry '{}'",
                String::from_utf8_lossy(other)
            );
            None
        }
    }
}

/// Child elements of a joint collected while scanning.
#[derive(Default)]
struct JointParts {
    parent: Option<String>,
    child: Option<String>,
    origin: UrdfOrigin,
    axis: Option<nalgebra::Vector3<f64>>,
    limit: JointLimit,
    mimic: Option<UrdfMimic>,
}

/// Parse a joint element.
fn parse_joint<R: BufRead>(reader: &mut Reader<R>, start: &BytesStart) -> Result<UrdfJoint> {
    let name = get_attribute(start, "name")?;
    let type_str = get_attribute(start, "type")?;
    let joint_type =
        JointType::from_str(&type_str).ok_or_else(|| UrdfError::UnknownJointType(type_str))?;

    let mut parts = JointParts::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                apply_joint_child(&mut parts, e)?;
                skip_element(reader, e.name().as_ref())?;
            }
            Ok(Event::Empty(ref e)) => apply_joint_child(&mut parts, e)?,
            Ok(Event::End(ref e)) if e.name().as_ref() == b"joint" => break,
            Ok(Event::Eof) => return Err(UrdfError::XmlParse("unexpected EOF in joint".into())),
            Ok(_) => {}
            Err(e) => return Err(UrdfError::XmlParse(e.to_string())),
        }
        buf.clear();
    }

    let parent = parts
        .parent
        .ok_or_else(|| UrdfError::missing_element("parent", format!("joint '{name}'")))?;
    let child = parts
        .child
        .ok_or_else(|| UrdfError::missing_element("child", format!("joint '{name}'")))?;

    let mut joint = UrdfJoint::new(name, joint_type, parent, child)
        .with_origin(parts.origin)
        .with_limit(parts.limit);

    if let Some(axis) = parts.axis {
        joint = joint.with_axis(axis);
    }
    if let Some(m) = parts.mimic {
        joint = joint.with_mimic(m);
    }

    Ok(joint)
}

fn apply_joint_child(parts: &mut JointParts, e: &BytesStart) -> Result<()> {
    match e.name().as_ref() {
        b"parent" => parts.parent = Some(get_attribute(e, "link")?),
        b"child" => parts.child = Some(get_attribute(e, "link")?),
        b"origin" => parts.origin = parse_origin(e),
        b"axis" => parts.axis = Some(parse_tuple(get_attribute_opt(e, "xyz").as_deref())),
        b"limit" => parts.limit = parse_joint_limit(e),
        b"mimic" => parts.mimic = Some(parse_mimic(e)?),
        _ => {}
    }
    Ok(())
}

/// Parse joint limit element.
fn parse_joint_limit(e: &BytesStart) -> JointLimit {
    JointLimit {
        lower: parse_float_attr(e, "lower").unwrap_or(0.0),
        upper: parse_float_attr(e, "upper").unwrap_or(0.0),
        effort: parse_float_attr(e, "effort"),
        velocity: parse_float_attr(e, "velocity"),
    }
}

/// Parse a mimic element.
fn parse_mimic(e: &BytesStart) -> Result<UrdfMimic> {
    let joint = get_attribute(e, "joint")?;
    Ok(UrdfMimic {
        joint,
        multiplier: parse_float_attr(e, "multiplier").unwrap_or(1.0),
        offset: parse_float_attr(e, "offset").unwrap_or(0.0),
    })
}

// ============================================================================
// Helper functions
// ============================================================================

/// Get a required attribute value.
fn get_attribute(e: &BytesStart, name: &'static str) -> Result<String> {
    get_attribute_opt(e, name).ok_or_else(|| UrdfError::missing_attribute(name, element_name(e)))
}

/// Get an optional attribute value.
fn get_attribute_opt(e: &BytesStart, name: &str) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == name.as_bytes() {
            return String::from_utf8(attr.value.to_vec()).ok();
        }
    }
    None
}

/// Parse a float attribute. `None` if absent, `NaN` if malformed.
fn parse_float_attr(e: &BytesStart, name: &str) -> Option<f64> {
    get_attribute_opt(e, name).map(|s| parse_number(&s))
}

/// Get element name as string for error messages.
fn element_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.name().as_ref()).to_string()
}

/// Skip an element and all its children.
fn skip_element<R: BufRead>(reader: &mut Reader<R>, name: &[u8]) -> Result<()> {
    let mut buf = Vec::new();
    let mut depth = 1;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == name => {
                depth += 1;
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == name => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(UrdfError::XmlParse(e.to_string())),
        }
        buf.clear();
    }

    Ok(())
}
