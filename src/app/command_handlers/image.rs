use crate::app::command_support::{ensure_runtime_root, load_settings};
use crate::sandbox::{
    build_image, ensure_image_usable, probe_image, runtime_available, ImageReadiness, ImageState,
};

enum ImageAction {
    Status,
    Build,
    Rebuild,
}

pub fn cmd_image(args: &[String]) -> Result<String, String> {
    let action = match args.first().map(String::as_str) {
        None | Some("status") => ImageAction::Status,
        Some("build") => ImageAction::Build,
        Some("rebuild") => ImageAction::Rebuild,
        Some(_) => return Err("usage: image <status|build|rebuild>".to_string()),
    };

    let settings = load_settings()?;
    let paths = ensure_runtime_root()?;
    let docker = settings.sandbox.local.docker_binary.clone();
    let tag = settings.sandbox.local.image_tag.clone();
    let context = settings.resolve_build_context(&paths);
    runtime_available(&docker).map_err(|e| e.to_string())?;

    match action {
        ImageAction::Status => {
            let state = match probe_image(&docker, &tag).map_err(|e| e.to_string())? {
                ImageState::Usable => "usable".to_string(),
                ImageState::Absent => "absent".to_string(),
                ImageState::Broken { detail } => format!("broken ({detail})"),
            };
            Ok([
                format!("image={tag}"),
                format!("state={state}"),
                format!("build_context={}", context.display()),
                format!(
                    "dockerfile={}",
                    if context.join("Dockerfile").is_file() {
                        "present"
                    } else {
                        "missing"
                    }
                ),
            ]
            .join("\n"))
        }
        ImageAction::Build => {
            let result = match ensure_image_usable(&docker, &tag, &context)
                .map_err(|e| e.to_string())?
            {
                ImageReadiness::AlreadyUsable => "already usable",
                ImageReadiness::Built => "built",
                ImageReadiness::Rebuilt => "rebuilt",
            };
            Ok(format!("image={tag}\nresult={result}"))
        }
        ImageAction::Rebuild => {
            build_image(&docker, &tag, &context).map_err(|e| e.to_string())?;
            match probe_image(&docker, &tag).map_err(|e| e.to_string())? {
                ImageState::Usable => Ok(format!("image={tag}\nresult=rebuilt")),
                ImageState::Absent => Err(format!("image {tag} is still missing after rebuild")),
                ImageState::Broken { detail } => Err(format!(
                    "image {tag} is still unusable after rebuild: {detail}"
                )),
            }
        }
    }
}
