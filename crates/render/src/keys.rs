use swarm_pool::new_key_type;

new_key_type! {
    pub struct WindowKey;
    pub struct WorldKey;
    pub struct ViewportKey;
    pub struct EnvironmentKey;
    pub struct ShaderKey;
    pub struct MeshKey;
    pub struct TextureKey;
    pub struct RenderBufferKey;
    pub struct FrameBufferKey;
    pub struct LightKey;
    pub struct ModelKey;
    pub struct CameraKey;
    pub struct MaterialKey;
    pub struct VisualKey;
}
