use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use tempfile::tempdir;
use ttree::core::io::lexer::Lexer;
use ttree::core::models::template::{SrcLoc, TemplateItem};
use ttree::core::models::transform::TransformChain;
use ttree::core::utils::geometry::AffineTransform;
use ttree::engine::config::{CompilerConfig, CompilerConfigBuilder};
use ttree::engine::progress::ProgressReporter;
use ttree::workflows::compile::{CompileOutput, compile_file, compile_str, write_outputs};

const TOLERANCE: f64 = 1e-6;
const XYZ_STYLE: &str = "atom-ID x y z";

fn xyz_config() -> CompilerConfig {
    CompilerConfigBuilder::new()
        .atom_style(XYZ_STYLE)
        .build()
        .unwrap()
}

fn compile_xyz(src: &str) -> CompileOutput {
    compile_str("main.lt", src, &xyz_config(), &ProgressReporter::new()).unwrap()
}

fn atom_positions(output: &CompileOutput) -> Vec<Point3<f64>> {
    output
        .channels
        .text("Data Atoms")
        .unwrap_or_default()
        .lines()
        .filter_map(|line| {
            let cols: Vec<f64> = line
                .split_whitespace()
                .skip(1)
                .map(|c| c.parse().unwrap())
                .collect();
            (cols.len() == 3).then(|| Point3::new(cols[0], cols[1], cols[2]))
        })
        .collect()
}

fn random_chain(rng: &mut StdRng) -> String {
    format!(
        "rot({},{},{},{}).move({},{},{}).scale({})",
        rng.gen_range(-180.0..180.0),
        rng.gen_range(0.1..1.0),
        rng.gen_range(-1.0..1.0),
        rng.gen_range(-1.0..1.0),
        rng.gen_range(-5.0..5.0),
        rng.gen_range(-5.0..5.0),
        rng.gen_range(-5.0..5.0),
        rng.gen_range(0.5..2.0),
    )
}

fn random_point(rng: &mut StdRng) -> [f64; 3] {
    [
        rng.gen_range(-10.0..10.0),
        rng.gen_range(-10.0..10.0),
        rng.gen_range(-10.0..10.0),
    ]
}

mod transforms {
    use super::*;

    #[test]
    fn push_then_pop_leaves_coordinates_unchanged() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let [x, y, z] = random_point(&mut rng);
            let src = format!(
                "push({})\npop()\nwrite(\"Data Atoms\") {{$atom:a {x} {y} {z}\n}}\n",
                random_chain(&mut rng)
            );
            let atoms = atom_positions(&compile_xyz(&src));
            assert_eq!(atoms.len(), 1);
            assert!((atoms[0] - Point3::new(x, y, z)).norm() < TOLERANCE);
        }
    }

    #[test]
    fn rotations_about_one_axis_compose_additively() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let axis = Vector3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(0.1..1.0),
            );
            let a = rng.gen_range(-360.0..360.0);
            let b = rng.gen_range(-360.0..360.0);
            let composed = AffineTransform::rotation(b, &axis).unwrap()
                * AffineTransform::rotation(a, &axis).unwrap();
            let direct = AffineTransform::rotation(a + b, &axis).unwrap();
            assert!(composed.approx_eq(&direct, 1e-9));
        }
    }

    #[test]
    fn chain_times_its_inverse_is_identity() {
        let mut rng = StdRng::seed_from_u64(3);
        let loc = SrcLoc::new("chain.lt", 1);
        for _ in 0..20 {
            let chain = TransformChain::parse(&random_chain(&mut rng), &loc).unwrap();
            let affine = chain.to_affine(None, &loc).unwrap();
            let inverse = affine.inverse().unwrap();
            assert!((affine * inverse).is_identity(1e-9));
        }
    }

    #[test]
    fn nested_move_is_applied_once() {
        let out = compile_xyz(
            "M {\npushright(move(1,0,0))\nwrite(\"Data Atoms\") {$atom:a 1.0 2.0 3.0\n}\npop()\n}\nm = new M\n",
        );
        let atoms = out.channels.text("Data Atoms").unwrap();
        assert_eq!(atoms.trim(), "1 2.0 2.0 3.0");
    }

    #[test]
    fn left_push_wraps_right_push() {
        let out = compile_xyz(
            "pushleft(rot(90,0,0,1))\npushright(move(1,0,0))\nwrite(\"Data Atoms\") {$atom:a 0.0 0.0 0.0\n}\npop()\npop()\n",
        );
        let atoms = atom_positions(&out);
        assert!((atoms[0] - Point3::new(0.0, 1.0, 0.0)).norm() < TOLERANCE);
    }

    #[test]
    fn movecm_lands_the_centroid_and_is_idempotent() {
        let mut rng = StdRng::seed_from_u64(19);
        for _ in 0..10 {
            let mut body = String::new();
            for _ in 0..4 {
                let [x, y, z] = random_point(&mut rng);
                body.push_str(&format!("$atom:a{} {x} {y} {z}\n", body.lines().count()));
            }
            let once = compile_xyz(&format!(
                "M {{ write(\"Data Atoms\") {{\n{body}}} }}\nm = new M.movecm(1,2,3)\n"
            ));
            let twice = compile_xyz(&format!(
                "M {{ write(\"Data Atoms\") {{\n{body}}} }}\nm = new M.movecm(1,2,3).movecm(1,2,3)\n"
            ));
            let first = atom_positions(&once);
            let second = atom_positions(&twice);
            assert_eq!(first.len(), 4);
            let sum = first.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords);
            assert!((sum / 4.0 - Vector3::new(1.0, 2.0, 3.0)).norm() < TOLERANCE);
            for (a, b) in first.iter().zip(&second) {
                assert!((a - b).norm() < TOLERANCE);
            }
        }
    }

    #[test]
    fn body_push_inside_a_movecm_instance_is_folded_where_it_is_written() {
        let out = compile_xyz(
            "M {\npush(move(5,0,0))\nwrite(\"Data Atoms\") {$atom:a 0.0 0.0 0.0\n}\npop()\nwrite(\"Data Atoms\") {$atom:b 0.0 0.0 0.0\n}\n}\nm = new M.movecm(1,0,0)\n",
        );
        let xs: Vec<f64> = atom_positions(&out).iter().map(|p| p.x).collect();
        assert_eq!(xs.len(), 2);
        assert!((xs[0] - 3.5).abs() < TOLERANCE);
        assert!((xs[1] + 1.5).abs() < TOLERANCE);
    }

    #[test]
    fn body_pushes_keep_their_offsets_under_a_deferred_chain() {
        let mut rng = StdRng::seed_from_u64(23);
        for _ in 0..10 {
            let [dx, dy, dz] = random_point(&mut rng);
            let out = compile_xyz(&format!(
                "M {{\npush(move({dx},{dy},{dz}))\nwrite(\"Data Atoms\") {{$atom:a 0.0 0.0 0.0\n}}\npop()\nwrite(\"Data Atoms\") {{$atom:b 0.0 0.0 0.0\n}}\n}}\nm = new M.movecm(0,0,0)\n"
            ));
            let atoms = atom_positions(&out);
            assert_eq!(atoms.len(), 2);
            assert!((atoms[0] - atoms[1] - Vector3::new(dx, dy, dz)).norm() < TOLERANCE);
            assert!(((atoms[0].coords + atoms[1].coords) / 2.0).norm() < TOLERANCE);
        }
    }
}

mod templates {
    use super::*;

    #[test]
    fn escapes_produce_a_single_literal_block() {
        let (template, _) = Lexer::from_text("t.lt", r"abc \$def \{ghi\}")
            .read_template("")
            .unwrap();
        assert_eq!(template.len(), 1);
        match &template[0] {
            TemplateItem::Text(t) => assert_eq!(t.text, "abc $def {ghi}"),
            TemplateItem::Var(v) => panic!("unexpected variable {}", v.descr),
        }
    }

    #[test]
    fn write_once_content_is_emitted_once_per_definition() {
        let out = compile_xyz(
            "A { write_once(\"In Settings\") { pair_coeff * *\n} }\nxs = new A [5]\n",
        );
        let text = out.channels.text("In Settings").unwrap();
        assert_eq!(text.matches("pair_coeff").count(), 1);
    }

    #[test]
    fn deleting_an_instance_removes_only_the_lines_that_mention_it() {
        let out = compile_xyz(
            "A { write(\"Data Atoms\") {$atom:x 0.0 0.0 0.0\n} }\na = new A [2]\ndelete a[0]\nwrite(\"Data Bonds\") {a\n$bond:b $atom:a[0]/x $atom:a[1]/x\nc\n}\n",
        );
        assert_eq!(out.channels.text("Data Bonds").unwrap(), "a\nc\n");
        assert_eq!(atom_positions(&out).len(), 1);
    }

    #[test]
    fn deletion_drops_one_line_per_mention_across_templates() {
        let out = compile_xyz(
            "A { write(\"Data Atoms\") {$atom:x 0.0 0.0 0.0\n} }\na = new A [2]\ndelete a[1]\nwrite(\"T\") {l1\n$atom:a[1]/x $atom:a[0]/x\nl3 $atom:a[0]/x\nl4\n}\nwrite(\"U\") {u $atom:a[0]/x\n}\n",
        );
        assert_eq!(out.channels.text("T").unwrap(), "l1\nl3 1\nl4\n");
        assert_eq!(out.channels.text("U").unwrap(), "u 1\n");
        assert_eq!(atom_positions(&out).len(), 1);
        assert!(out.bindings.iter().any(|b| b.name == "$/atom:a[0]/x"));
    }
}

mod files {
    use super::*;

    #[test]
    fn imported_library_is_compiled_and_reported() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("water.lt"),
            "Water {\nwrite(\"Data Atoms\") {\n$atom:o 0.0 0.0 0.0\n$atom:h 0.9572 0.0 0.0\n}\n}\n",
        )
        .unwrap();
        let main = dir.path().join("system.lt");
        fs::write(
            &main,
            "import \"water.lt\"\nimport \"water.lt\"\nwat = new Water [2].move(3,0,0)\n",
        )
        .unwrap();

        let out = compile_file(&main, &xyz_config(), &ProgressReporter::new()).unwrap();
        let atoms = atom_positions(&out);
        assert_eq!(atoms.len(), 4);
        assert!((atoms[2] - Point3::new(3.0, 0.0, 0.0)).norm() < TOLERANCE);

        let out_dir = dir.path().join("out");
        write_outputs(&out_dir, &out).unwrap();
        let report = fs::read_to_string(out_dir.join("ttree_assignments.txt")).unwrap();
        assert!(report.contains("$/atom:wat[1]/h 4"));
        assert!(out_dir.join("Data Atoms").is_file());
    }
}
