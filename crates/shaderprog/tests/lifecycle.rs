use glam::{Mat4, Vec3, Vec4};
use shaderprog::driver::UploadedValue;
use shaderprog::{
    AttributeSemantic, Capabilities, GpuDriver, HeadlessDriver, Hydration, MemoryLoader,
    ProgramError, ProgramId, ProgramState, ShaderProgram, ShaderStage, Uniform, UniformKind,
};

const VERTEX: &str = "\
uniform mat4 mvp_matrix;
uniform mat4 tex_norm_matrix;
uniform mat4 norm_norm_matrix;
void main() {}
";

const FRAGMENT: &str = "\
#include lighting
uniform vec3 tint;
uniform vec4 fog[2];
uniform int mode;
uniform float strength;
uniform mat4 bones;
uniform sampler2D albedo;
uniform sampler2D detail;
void main() {}
";

fn loader() -> MemoryLoader {
    MemoryLoader::new()
        .with("lit.vert", VERTEX)
        .with("lit.frag", FRAGMENT)
        .with(
            "lighting",
            "layout(std140) uniform lighting {\n    vec4 ambient;\n};\n",
        )
}

fn lit_program() -> ShaderProgram {
    let mut program = ShaderProgram::new(
        ProgramId::new(7),
        "lit.vert",
        "lit.frag",
        Capabilities::TEXCOORD,
        &loader(),
    )
    .expect("program builds");
    program.set_uniforms([
        Uniform::new(UniformKind::Float3, "tint", 1),
        Uniform::new(UniformKind::Float4, "fog", 2),
        Uniform::new(UniformKind::Int, "mode", 1),
        Uniform::new(UniformKind::Float, "strength", 1),
        Uniform::new(UniformKind::Mat4, "bones", 1),
    ]);
    program.set_samplers(["albedo", "detail"]);
    program
}

#[test]
fn include_example_inflates_fragment() {
    let loader = MemoryLoader::new()
        .with("flat.vert", "void main(){}\n")
        .with("lit.frag", "#include lighting\nvoid main(){}\n")
        .with("lighting", "vec3 light;\n");
    let program = ShaderProgram::new(
        ProgramId::new(1),
        "flat.vert",
        "lit.frag",
        Capabilities::empty(),
        &loader,
    )
    .expect("program builds");
    assert_eq!(program.vertex_source(), "void main(){}\n");
    assert_eq!(program.fragment_source(), "vec3 light;\nvoid main(){}\n");
    assert_eq!(program.name(), "lit.frag");
}

#[test]
fn fresh_program_is_cold_and_evict_is_harmless() {
    let mut driver = HeadlessDriver::new();
    let mut program = lit_program();
    assert_eq!(program.state(), ProgramState::Cold);
    assert_eq!(program.handle(), None);

    program.evict(&mut driver);
    assert_eq!(program.state(), ProgramState::Cold);
    assert_eq!(program.handle(), None);
    assert_eq!(driver.stats().programs_deleted, 0);
}

#[test]
fn hydrate_then_bind() {
    let mut driver = HeadlessDriver::new();
    let mut program = lit_program();
    assert!(!program.bind(&mut driver), "cold program must not bind");

    assert_eq!(program.hydrate(&mut driver).unwrap(), Hydration::Linked);
    assert_eq!(program.state(), ProgramState::Hydrated);
    assert!(program.handle().is_some());
    assert_eq!(program.lighting_block_index(), Some(0));
    assert!(program.bind(&mut driver));
    assert_eq!(driver.current_program(), program.handle());

    // shader objects are released once linked
    assert_eq!(driver.live_shaders(), 0);
    assert_eq!(program.hydrate(&mut driver).unwrap(), Hydration::Linked);
    assert_eq!(driver.stats().links, 1);

    program.unbind(&mut driver);
    assert_eq!(driver.current_program(), None);
    program.evict(&mut driver);
}

#[test]
fn attribute_slots_follow_capabilities() {
    let mut driver = HeadlessDriver::new();
    let mut program = lit_program();
    program.add_attribute(AttributeSemantic::Color);
    program.hydrate(&mut driver).unwrap();

    let bindings = driver.attribute_bindings(program.handle().unwrap());
    assert_eq!(
        bindings,
        vec![
            ("color".to_string(), 2),
            ("position".to_string(), 0),
            ("texcoord".to_string(), 3),
        ]
    );
    program.evict(&mut driver);
}

#[test]
fn missing_context_defers_hydration() {
    let mut driver = HeadlessDriver::without_context();
    let mut program = lit_program();
    assert_eq!(program.hydrate(&mut driver).unwrap(), Hydration::Deferred);
    assert_eq!(program.state(), ProgramState::Cold);
    assert!(!program.bind(&mut driver));

    driver.set_context_available(true);
    assert_eq!(program.hydrate(&mut driver).unwrap(), Hydration::Linked);
    assert!(program.bind(&mut driver));
    program.evict(&mut driver);
}

#[test]
fn compile_failure_marks_program_failed() {
    let mut driver = HeadlessDriver::new();
    driver.fail_compile(Some(ShaderStage::Vertex));
    let mut program = lit_program();

    match program.hydrate(&mut driver) {
        Err(ProgramError::Compile {
            stage, log, code, ..
        }) => {
            assert_eq!(stage, ShaderStage::Vertex);
            assert!(log.contains("injected vertex"));
            assert_eq!(code, VERTEX);
        }
        other => panic!("expected compile error, got {other:?}"),
    }
    assert_eq!(program.state(), ProgramState::Failed);
    assert_eq!(driver.live_programs(), 0);
    assert_eq!(driver.live_shaders(), 0);

    driver.fail_compile(None);
    assert!(matches!(
        program.hydrate(&mut driver),
        Err(ProgramError::Failed { .. })
    ));
    assert!(!program.bind(&mut driver));

    program.evict(&mut driver);
    assert_eq!(program.state(), ProgramState::Failed);
}

#[test]
fn link_failure_releases_everything() {
    let mut driver = HeadlessDriver::new();
    driver.fail_link(true);
    let mut program = lit_program();
    assert!(matches!(
        program.hydrate(&mut driver),
        Err(ProgramError::Link { .. })
    ));
    assert_eq!(program.state(), ProgramState::Failed);
    assert_eq!(driver.live_programs(), 0);
    assert_eq!(driver.live_shaders(), 0);
}

#[test]
fn validation_failure_only_warns() {
    let mut driver = HeadlessDriver::new();
    driver.fail_validate(true);
    let mut program = lit_program();
    program.set_validation(true);
    assert_eq!(program.hydrate(&mut driver).unwrap(), Hydration::Linked);
    assert_eq!(driver.stats().validations, 1);
    assert!(program.bind(&mut driver));
    program.evict(&mut driver);
}

#[test]
fn reflection_runs_once_per_hydration() {
    let mut driver = HeadlessDriver::new();
    let mut program = lit_program();
    program.hydrate(&mut driver).unwrap();

    assert!(program.bind(&mut driver));
    let after_first = driver.stats().location_queries;
    // five uniforms, two samplers, two enabled transforms
    assert_eq!(after_first, 9);
    assert_eq!(program.bindings().reflections(), 1);

    assert!(program.bind(&mut driver));
    assert_eq!(driver.stats().location_queries, after_first);
    assert_eq!(program.bindings().reflections(), 1);

    program.add_uniform(Uniform::new(UniformKind::Float, "extra", 1));
    assert!(program.bind(&mut driver));
    assert!(driver.stats().location_queries > after_first);
    assert_eq!(program.bindings().reflections(), 2);

    let queries = driver.stats().location_queries;
    program.add_sampler("albedo_late");
    assert!(program.bind(&mut driver));
    assert!(driver.stats().location_queries > queries);
    program.evict(&mut driver);
}

#[test]
fn resolved_uniforms_upload_while_a_late_declaration_waits() {
    let mut driver = HeadlessDriver::new();
    let mut program = lit_program();
    program.hydrate(&mut driver).unwrap();
    assert!(program.bind(&mut driver));

    program.add_uniform(Uniform::new(UniformKind::Float, "extra", 1));
    assert!(program.bindings().needs_rebind());
    assert!(program.set_vec3(&mut driver, "tint", Vec3::ONE));
    let tint = program.uniform_by_name("tint").unwrap().location().unwrap();
    assert_eq!(
        driver.last_upload(tint).unwrap().value,
        UploadedValue::Floats(vec![1.0, 1.0, 1.0])
    );
    assert!(program.set_vertex_transform(&mut driver, &Mat4::IDENTITY));

    // not reflected yet
    assert!(!program.set_float(&mut driver, "extra", 2.0));
    assert!(program.bind(&mut driver));
    assert!(!program.bindings().needs_rebind());
    assert_eq!(program.uniform_by_name("tint").unwrap().location(), Some(tint));
    program.evict(&mut driver);
}

#[test]
fn setters_wait_while_another_program_is_current() {
    let mut driver = HeadlessDriver::new();
    let mut first = lit_program();
    let mut second = lit_program();
    first.hydrate(&mut driver).unwrap();
    second.hydrate(&mut driver).unwrap();
    assert!(first.bind(&mut driver));
    assert!(second.bind(&mut driver));

    let before = driver.stats().uploads;
    assert!(!first.set_vec3(&mut driver, "tint", Vec3::ONE));
    assert_eq!(driver.stats().uploads, before);
    assert_eq!(
        first.uniform_by_name("tint").unwrap().float_values(),
        Some(&[1.0, 1.0, 1.0][..])
    );
    first.evict(&mut driver);
    second.evict(&mut driver);
}

#[test]
fn samplers_get_units_in_declaration_order() {
    let mut driver = HeadlessDriver::new();
    let mut program = lit_program();
    program.hydrate(&mut driver).unwrap();
    assert!(program.bind(&mut driver));

    for (name, unit) in [("albedo", 0), ("detail", 1)] {
        let binding = program
            .bindings()
            .samplers()
            .iter()
            .find(|binding| binding.name == name)
            .expect("sampler bound");
        assert_eq!(binding.unit, unit);
        let upload = driver
            .last_upload(binding.location.expect("sampler location"))
            .expect("unit written");
        assert_eq!(upload.value, UploadedValue::Ints(vec![unit as i32]));
    }
    program.evict(&mut driver);
}

#[test]
fn undeclared_name_is_a_silent_no_op() {
    let mut driver = HeadlessDriver::new();
    let mut program = lit_program();
    program.hydrate(&mut driver).unwrap();
    assert!(program.bind(&mut driver));

    let before = driver.stats();
    assert!(!program.set_float(&mut driver, "nonexistent", 1.0));
    assert!(!program.set_vec3(&mut driver, "also_missing", Vec3::ZERO));
    assert_eq!(driver.stats(), before);
    program.evict(&mut driver);
}

#[test]
fn typed_setters_upload_expected_layouts() {
    let mut driver = HeadlessDriver::new();
    let mut program = lit_program();
    program.hydrate(&mut driver).unwrap();
    assert!(program.bind(&mut driver));

    assert!(program.set_int(&mut driver, "mode", 3));
    assert!(program.set_float(&mut driver, "strength", 0.5));
    assert!(program.set_vec3(&mut driver, "tint", Vec3::new(1.0, 2.0, 3.0)));
    let fog = [Vec4::splat(1.0), Vec4::splat(2.0)];
    let index = program.uniform_index("fog").expect("fog declared");
    assert!(program.set_uniform_at(&mut driver, index, bytemuck::cast_slice(&fog)));
    let bones = Mat4::from_translation(Vec3::new(4.0, 5.0, 6.0));
    assert!(program.set_mat4(&mut driver, "bones", &bones));

    let location = |name: &str| program.uniform_by_name(name).unwrap().location().unwrap();
    assert_eq!(
        driver.last_upload(location("mode")).unwrap().value,
        UploadedValue::Ints(vec![3])
    );
    assert_eq!(
        driver.last_upload(location("fog")).unwrap().value,
        UploadedValue::Floats(vec![1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0])
    );
    assert_eq!(
        driver.last_upload(location("bones")).unwrap().value,
        UploadedValue::Floats(bones.to_cols_array().to_vec())
    );
    assert_eq!(
        program.uniform_by_name("tint").unwrap().float_values(),
        Some(&[1.0, 2.0, 3.0][..])
    );
    program.evict(&mut driver);
}

#[test]
fn transforms_respect_capabilities_and_frame_latch() {
    let mut driver = HeadlessDriver::new();
    let mut program = lit_program();
    program.hydrate(&mut driver).unwrap();
    assert!(program.bind(&mut driver));

    assert!(program.set_vertex_transform(&mut driver, &Mat4::IDENTITY));
    assert!(program.set_texture_transform(&mut driver, &Mat4::IDENTITY));
    // NORMAL capability was never declared
    assert!(!program.set_normal_transform(&mut driver, &Mat4::IDENTITY));
    program.evict(&mut driver);
}

#[test]
fn evict_then_hydrate_restores_every_binding() {
    let mut driver = HeadlessDriver::new();
    let mut program = lit_program();
    program.hydrate(&mut driver).unwrap();
    assert!(program.bind(&mut driver));
    let first: Vec<_> = program
        .uniforms()
        .iter()
        .map(|uniform| (uniform.name().to_string(), uniform.location()))
        .collect();
    assert!(first.iter().all(|(_, location)| location.is_some()));

    program.evict(&mut driver);
    assert_eq!(program.state(), ProgramState::Cold);
    assert_eq!(program.handle(), None);
    assert!(program.uniforms().iter().all(|uniform| uniform.location().is_none()));
    assert_eq!(program.lighting_block_index(), None);
    assert_eq!(driver.live_programs(), 0);

    // the context comes back with fresh object names
    driver.set_context_available(false);
    driver.set_context_available(true);
    assert_eq!(program.hydrate(&mut driver).unwrap(), Hydration::Linked);
    assert!(program.bind(&mut driver));
    assert_eq!(program.bindings().reflections(), 2);
    assert_eq!(program.lighting_block_index(), Some(0));

    let second: Vec<_> = program
        .uniforms()
        .iter()
        .map(|uniform| (uniform.name().to_string(), uniform.location()))
        .collect();
    assert_eq!(first.len(), second.len());
    for ((first_name, _), (second_name, location)) in first.iter().zip(&second) {
        assert_eq!(first_name, second_name);
        assert!(location.is_some(), "{second_name} not reflected after rehydration");
    }
    assert_eq!(program.vertex_source(), VERTEX);
    program.evict(&mut driver);
}
